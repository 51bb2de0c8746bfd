pub mod client;
#[cfg(feature = "desktop")]
pub mod commands;
pub mod types;

pub use client::{HttpEngineClient, MeasurementEngine};
pub use types::{
    CalibrationStatus, EngineStatus, LiveMeasurement, LiveMeasurementEvent, LiveSnapshot,
    StartRequest,
};
