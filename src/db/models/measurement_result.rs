//! Persisted QC result rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::MeasurementStatus;

/// One row of `measurement_results`, unique per
/// (order line, measurement, size).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementResult {
    pub order_line_id: i64,
    pub measurement_id: i64,
    pub size: String,
    pub article_style: String,
    pub measured_value: Option<f64>,
    pub expected_value: f64,
    pub tolerance_plus: f64,
    pub tolerance_minus: f64,
    pub status: MeasurementStatus,
    pub operator_id: String,
    pub updated_at: DateTime<Utc>,
}
