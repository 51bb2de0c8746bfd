use super::state::{MeasurementsUpdate, SessionSnapshot};

pub const STATE_CHANGED_EVENT: &str = "session-state-changed";
pub const MEASUREMENTS_UPDATED_EVENT: &str = "measurements-updated";
pub const SAVE_FAILED_EVENT: &str = "save-failed";

#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(SessionSnapshot),
    MeasurementsUpdated(MeasurementsUpdate),
    SaveFailed(String),
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::StateChanged(_) => STATE_CHANGED_EVENT,
            SessionEvent::MeasurementsUpdated(_) => MEASUREMENTS_UPDATED_EVENT,
            SessionEvent::SaveFailed(_) => SAVE_FAILED_EVENT,
        }
    }
}

/// Sink for controller notifications; the desktop shell forwards them to the
/// webview.
pub trait SessionEvents: Send + Sync {
    fn emit(&self, event: SessionEvent);
}
