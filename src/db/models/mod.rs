pub mod measurement_result;

pub use measurement_result::MeasurementResult;
