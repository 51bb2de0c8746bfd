use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

use crate::models::MeasurementStatus;

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_status(value: &str) -> Result<MeasurementStatus> {
    match value {
        "PENDING" => Ok(MeasurementStatus::Pending),
        "PASS" => Ok(MeasurementStatus::Pass),
        "FAIL" => Ok(MeasurementStatus::Fail),
        other => Err(anyhow!("unknown measurement status {other}")),
    }
}

/// Canonical form used for size comparisons and for the results key.
pub fn normalize_size(size: &str) -> String {
    size.trim().to_uppercase()
}
