#[cfg(feature = "desktop")]
pub mod commands;
pub mod controller;
pub mod events;
pub mod persist;
pub mod reconcile;
pub mod state;

pub use controller::{SessionConfig, SessionController};
pub use events::{SessionEvent, SessionEvents};
pub use persist::{ResultPersister, SaveBatch, SaveItem, SaveOutcome};
pub use reconcile::{calculate_status, merge};
pub use state::{MeasurementsUpdate, SessionPhase, SessionSnapshot, SessionState, SpecView};
