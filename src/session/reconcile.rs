//! Positional correlation of engine readings with specifications.
//!
//! The engine knows nothing about specification ids. It reports the Nth
//! keypoint pair as `positional_id = N`, and the Nth specification in
//! resolution order (measurement id ascending) is the one it measured. The
//! annotation's target distances are built from the same ordering, so the
//! two sides stay aligned as long as the resolved list does not change
//! during a session.

use crate::engine::LiveMeasurementEvent;
use crate::models::{MeasuredValues, MeasurementSpecification, MeasurementStatus, ToleranceOverride};

/// Absorbs float error when a value sits exactly on a tolerance bound, e.g.
/// `70.0 - 0.5` against a stored `69.50`. Far below display precision.
const BOUND_EPSILON: f64 = 1e-9;

/// Display form of a measured value.
pub fn format_value(value: f64) -> String {
    format!("{value:.2}")
}

/// Applies `events` on top of `current`. Returns the merged values and
/// whether any displayed string changed.
pub fn merge(
    specs: &[MeasurementSpecification],
    current: &MeasuredValues,
    events: &[LiveMeasurementEvent],
) -> (MeasuredValues, bool) {
    let mut merged = current.clone();
    let mut changed = false;

    for event in events {
        let Some(index) = (event.positional_id as usize).checked_sub(1) else {
            continue;
        };
        let Some(spec) = specs.get(index) else {
            continue;
        };
        if !event.actual_value_cm.is_finite() {
            continue;
        }

        let formatted = format_value(event.actual_value_cm);
        if merged.get(&spec.id) != Some(&formatted) {
            merged.insert(spec.id, formatted);
            changed = true;
        }
    }

    (merged, changed)
}

/// `(plus, minus)` in effect for a spec, both as magnitudes.
pub fn effective_tolerances(
    spec: &MeasurementSpecification,
    tolerance_override: Option<&ToleranceOverride>,
) -> (f64, f64) {
    match tolerance_override {
        Some(edit) => (edit.tolerance_plus.abs(), edit.tolerance_minus.abs()),
        None => (spec.tolerance_plus.abs(), spec.tolerance_minus.abs()),
    }
}

pub fn parse_value(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|parsed| parsed.is_finite())
}

pub fn calculate_status(
    spec: &MeasurementSpecification,
    value: Option<&str>,
    tolerance_override: Option<&ToleranceOverride>,
) -> MeasurementStatus {
    let Some(measured) = value.and_then(parse_value) else {
        return MeasurementStatus::Pending;
    };

    let (plus, minus) = effective_tolerances(spec, tolerance_override);
    let low = spec.expected_value - minus - BOUND_EPSILON;
    let high = spec.expected_value + plus + BOUND_EPSILON;

    if (low..=high).contains(&measured) {
        MeasurementStatus::Pass
    } else {
        MeasurementStatus::Fail
    }
}
