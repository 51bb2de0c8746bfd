use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Mutex,
};

use async_trait::async_trait;
use serde_json::json;

use magicqc_lib::annotation::{RawAnnotation, ReferenceImage};
use magicqc_lib::catalog::AnnotationSource;
use magicqc_lib::engine::{
    CalibrationStatus, EngineStatus, LiveMeasurement, LiveSnapshot, MeasurementEngine,
    StartRequest,
};
use magicqc_lib::session::{SessionEvent, SessionEvents};
use magicqc_lib::{QcError, QcResult};

/// Scripted measurement engine.
#[derive(Default)]
pub struct FakeEngine {
    /// Start calls that fail before one succeeds.
    failing_starts: AtomicU32,
    pub start_calls: AtomicU32,
    pub stop_calls: AtomicU32,
    pub restart_calls: AtomicU32,
    pub live_calls: AtomicU32,
    failing_stop: AtomicBool,
    /// Live polls that fail before readings come back.
    failing_polls: AtomicU32,
    live: Mutex<Option<LiveSnapshot>>,
    last_request: Mutex<Option<StartRequest>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_starts(count: u32) -> Self {
        let engine = Self::default();
        engine.failing_starts.store(count, Ordering::SeqCst);
        engine
    }

    /// Readings returned by every following live poll.
    pub fn set_live(&self, readings: &[(u32, f64)]) {
        self.set_snapshot(true, readings);
    }

    /// Readings the engine flags as left over from an earlier run.
    pub fn set_stale(&self, readings: &[(u32, f64)]) {
        self.set_snapshot(false, readings);
    }

    pub fn fail_stop(&self) {
        self.failing_stop.store(true, Ordering::SeqCst);
    }

    pub fn fail_polls(&self, count: u32) {
        self.failing_polls.store(count, Ordering::SeqCst);
    }

    fn set_snapshot(&self, is_live: bool, readings: &[(u32, f64)]) {
        let snapshot = LiveSnapshot {
            is_live,
            measurements: readings
                .iter()
                .map(|(id, value)| LiveMeasurement {
                    id: *id,
                    name: None,
                    actual_cm: *value,
                    qc_passed: None,
                })
                .collect(),
        };
        *self.live.lock().unwrap() = Some(snapshot);
    }

    pub fn last_request(&self) -> Option<StartRequest> {
        self.last_request.lock().unwrap().clone()
    }

    pub fn starts(&self) -> u32 {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> u32 {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn restarts(&self) -> u32 {
        self.restart_calls.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> u32 {
        self.live_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MeasurementEngine for FakeEngine {
    async fn start(&self, request: &StartRequest) -> QcResult<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failing_starts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_starts.store(remaining - 1, Ordering::SeqCst);
            return Err(QcError::EngineUnreachable("connection refused".into()));
        }
        *self.last_request.lock().unwrap() = Some(request.clone());
        Ok(())
    }

    async fn stop(&self) -> QcResult<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_stop.load(Ordering::SeqCst) {
            return Err(QcError::EngineRejected("No measurement is running".into()));
        }
        Ok(())
    }

    async fn status(&self) -> QcResult<EngineStatus> {
        Ok(EngineStatus::default())
    }

    async fn live_results(&self) -> QcResult<Option<LiveSnapshot>> {
        self.live_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failing_polls.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_polls.store(remaining - 1, Ordering::SeqCst);
            return Err(QcError::EngineUnreachable("read timed out".into()));
        }
        Ok(self.live.lock().unwrap().clone())
    }

    async fn restart(&self) -> QcResult<()> {
        self.restart_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn calibration_status(&self) -> QcResult<CalibrationStatus> {
        Ok(CalibrationStatus::default())
    }

    async fn start_calibration(&self) -> QcResult<()> {
        Ok(())
    }

    async fn cancel_calibration(&self) -> QcResult<()> {
        Ok(())
    }
}

/// Annotation source returning one fixed record.
pub struct FakeAnnotations {
    annotation: Option<RawAnnotation>,
    requests: Mutex<Vec<(String, String)>>,
}

impl FakeAnnotations {
    pub fn with(annotation: RawAnnotation) -> Self {
        Self {
            annotation: Some(annotation),
            requests: Mutex::default(),
        }
    }

    pub fn empty() -> Self {
        Self {
            annotation: None,
            requests: Mutex::default(),
        }
    }

    /// `(style, size)` of every fetch so far.
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnnotationSource for FakeAnnotations {
    async fn fetch_annotation(
        &self,
        article_style: &str,
        size: &str,
    ) -> QcResult<Option<RawAnnotation>> {
        self.requests
            .lock()
            .unwrap()
            .push((article_style.to_string(), size.to_string()));
        Ok(self.annotation.clone())
    }
}

/// Four keypoints, two pairs, on a 640x480 reference image.
pub fn sample_annotation() -> RawAnnotation {
    RawAnnotation {
        keypoints: Some(json!("[[10, 10], [110, 10], [10, 50], [10, 150]]")),
        target_distances: Some(json!({"1": 99.0})),
        image_width: Some(640),
        image_height: Some(480),
        image: Some(ReferenceImage {
            base64: "aGVsbG8=".into(),
            mime_type: Some("image/jpeg".into()),
        }),
        ..Default::default()
    }
}

/// Keeps the names of emitted events.
#[derive(Default)]
pub struct RecordingEvents {
    names: Mutex<Vec<&'static str>>,
}

impl RecordingEvents {
    pub fn count(&self, name: &str) -> usize {
        self.names
            .lock()
            .unwrap()
            .iter()
            .filter(|recorded| **recorded == name)
            .count()
    }
}

impl SessionEvents for RecordingEvents {
    fn emit(&self, event: SessionEvent) {
        self.names.lock().unwrap().push(event.name());
    }
}
