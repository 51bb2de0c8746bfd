use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::annotation::{AnnotationDescriptor, AnnotationSummary};
use crate::db::MeasurementResult;
use crate::models::{
    MeasuredValues, MeasurementSpecification, MeasurementStatus, SessionContext,
    ToleranceOverride, ToleranceOverrides,
};
use crate::specs::{Resolution, ResolutionStrategy};

use super::persist::{SaveBatch, SaveItem, SaveOutcome};
use super::reconcile::{calculate_status, effective_tolerances, format_value, parse_value};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    Idle,
    SpecsResolved,
    Armed,
    Running,
    Complete,
}

/// Data carried by every non-idle phase.
#[derive(Debug, Clone)]
pub struct SessionData {
    pub context: SessionContext,
    pub resolution: Resolution,
    pub values: MeasuredValues,
    pub overrides: ToleranceOverrides,
    pub last_save: Option<SaveOutcome>,
    /// Bumped on every value or tolerance change.
    pub revision: u64,
    /// Revision last written successfully.
    pub saved_revision: u64,
}

impl SessionData {
    pub fn new(context: SessionContext, resolution: Resolution) -> Self {
        Self {
            context,
            resolution,
            values: MeasuredValues::new(),
            overrides: ToleranceOverrides::new(),
            last_save: None,
            revision: 0,
            saved_revision: 0,
        }
    }

    pub fn specs(&self) -> &[MeasurementSpecification] {
        &self.resolution.specs
    }

    pub fn spec(&self, spec_id: i64) -> Option<&MeasurementSpecification> {
        self.resolution.specs.iter().find(|spec| spec.id == spec_id)
    }

    pub fn is_dirty(&self) -> bool {
        self.revision != self.saved_revision
    }

    pub fn touch(&mut self) {
        self.revision += 1;
    }

    /// Every specification holds a numeric value.
    pub fn all_measured(&self) -> bool {
        self.resolution.specs.iter().all(|spec| {
            self.values
                .get(&spec.id)
                .and_then(|value| parse_value(value))
                .is_some()
        })
    }

    pub fn status_of(&self, spec: &MeasurementSpecification) -> MeasurementStatus {
        calculate_status(
            spec,
            self.values.get(&spec.id).map(String::as_str),
            self.overrides.get(&spec.id),
        )
    }

    /// Seeds values and tolerance edits from rows saved earlier for the same
    /// order line and size.
    pub fn apply_stored(&mut self, rows: &[MeasurementResult]) {
        for row in rows {
            let Some(spec) = self.spec(row.measurement_id).cloned() else {
                continue;
            };
            if let Some(value) = row.measured_value {
                self.values.insert(spec.id, format_value(value));
            }
            let (plus, minus) = effective_tolerances(&spec, None);
            if row.tolerance_plus != plus || row.tolerance_minus != minus {
                self.overrides.insert(
                    spec.id,
                    ToleranceOverride {
                        spec_id: spec.id,
                        tolerance_plus: row.tolerance_plus,
                        tolerance_minus: row.tolerance_minus,
                    },
                );
            }
        }
    }

    pub fn save_batch(&self) -> SaveBatch {
        SaveBatch {
            order_line_id: self.context.order_line_id,
            size: self.context.size.clone(),
            article_style: self.context.article.article_style.clone(),
            operator_id: self.context.operator_id.clone(),
            items: self
                .resolution
                .specs
                .iter()
                .map(|spec| SaveItem {
                    spec: spec.clone(),
                    value: self.values.get(&spec.id).cloned(),
                    tolerance_override: self.overrides.get(&spec.id).copied(),
                })
                .collect(),
        }
    }

    pub fn measurements_update(&self) -> MeasurementsUpdate {
        MeasurementsUpdate {
            values: self.values.clone(),
            statuses: self
                .resolution
                .specs
                .iter()
                .map(|spec| (spec.id, self.status_of(spec)))
                .collect(),
        }
    }

    fn spec_views(&self) -> Vec<SpecView> {
        self.resolution
            .specs
            .iter()
            .enumerate()
            .map(|(index, spec)| {
                let tolerance_override = self.overrides.get(&spec.id);
                let (tolerance_plus, tolerance_minus) =
                    effective_tolerances(spec, tolerance_override);
                SpecView {
                    position: index + 1,
                    spec: spec.clone(),
                    tolerance_plus,
                    tolerance_minus,
                    overridden: tolerance_override.is_some(),
                    value: self.values.get(&spec.id).cloned(),
                    status: self.status_of(spec),
                }
            })
            .collect()
    }
}

/// Lifecycle of one measurement session.
#[derive(Debug, Clone, Default)]
pub enum SessionState {
    #[default]
    Idle,
    SpecsResolved(SessionData),
    /// Annotation ready, engine start in flight.
    Armed {
        data: SessionData,
        annotation: AnnotationDescriptor,
    },
    Running {
        data: SessionData,
        annotation: AnnotationDescriptor,
        run_id: String,
        count_mismatch_logged: bool,
    },
    Complete {
        data: SessionData,
        annotation: AnnotationDescriptor,
    },
}

impl SessionState {
    pub fn phase(&self) -> SessionPhase {
        match self {
            SessionState::Idle => SessionPhase::Idle,
            SessionState::SpecsResolved(_) => SessionPhase::SpecsResolved,
            SessionState::Armed { .. } => SessionPhase::Armed,
            SessionState::Running { .. } => SessionPhase::Running,
            SessionState::Complete { .. } => SessionPhase::Complete,
        }
    }

    /// The engine owns the values while armed or running.
    pub fn is_measuring(&self) -> bool {
        matches!(
            self,
            SessionState::Armed { .. } | SessionState::Running { .. }
        )
    }

    pub fn data(&self) -> Option<&SessionData> {
        match self {
            SessionState::Idle => None,
            SessionState::SpecsResolved(data)
            | SessionState::Armed { data, .. }
            | SessionState::Running { data, .. }
            | SessionState::Complete { data, .. } => Some(data),
        }
    }

    pub fn data_mut(&mut self) -> Option<&mut SessionData> {
        match self {
            SessionState::Idle => None,
            SessionState::SpecsResolved(data)
            | SessionState::Armed { data, .. }
            | SessionState::Running { data, .. }
            | SessionState::Complete { data, .. } => Some(data),
        }
    }

    pub fn annotation(&self) -> Option<&AnnotationDescriptor> {
        match self {
            SessionState::Idle | SessionState::SpecsResolved(_) => None,
            SessionState::Armed { annotation, .. }
            | SessionState::Running { annotation, .. }
            | SessionState::Complete { annotation, .. } => Some(annotation),
        }
    }

    pub fn run_id(&self) -> Option<&str> {
        match self {
            SessionState::Running { run_id, .. } => Some(run_id),
            _ => None,
        }
    }

    /// Moves the state out, leaving `Idle` behind.
    pub fn take(&mut self) -> SessionState {
        std::mem::take(self)
    }

    pub fn snapshot(&self, last_error: Option<&str>) -> SessionSnapshot {
        let data = self.data();
        SessionSnapshot {
            phase: self.phase(),
            context: data.map(|data| data.context.clone()),
            specs: data.map(SessionData::spec_views).unwrap_or_default(),
            values: data.map(|data| data.values.clone()).unwrap_or_default(),
            available_sizes: data
                .map(|data| data.resolution.available_sizes.clone())
                .unwrap_or_default(),
            article_id: data.and_then(|data| data.resolution.article_id),
            strategy: data.and_then(|data| data.resolution.strategy),
            annotation: self.annotation().map(AnnotationDescriptor::summary),
            run_id: self.run_id().map(str::to_string),
            all_measured: data.map(SessionData::all_measured).unwrap_or(false),
            unsaved_changes: data.map(SessionData::is_dirty).unwrap_or(false),
            last_save: data.and_then(|data| data.last_save.clone()),
            error: last_error.map(str::to_string),
        }
    }
}

/// Specification as shown on the panel, with the tolerances in effect.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpecView {
    /// 1-based position; the engine reports this pair index.
    pub position: usize,
    #[serde(flatten)]
    pub spec: MeasurementSpecification,
    #[serde(rename = "effectiveTolerancePlus")]
    pub tolerance_plus: f64,
    #[serde(rename = "effectiveToleranceMinus")]
    pub tolerance_minus: f64,
    pub overridden: bool,
    pub value: Option<String>,
    pub status: MeasurementStatus,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementsUpdate {
    pub values: MeasuredValues,
    pub statuses: BTreeMap<i64, MeasurementStatus>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub context: Option<SessionContext>,
    pub specs: Vec<SpecView>,
    pub values: MeasuredValues,
    pub available_sizes: Vec<String>,
    pub article_id: Option<i64>,
    pub strategy: Option<ResolutionStrategy>,
    pub annotation: Option<AnnotationSummary>,
    pub run_id: Option<String>,
    pub all_measured: bool,
    pub unsaved_changes: bool,
    pub last_save: Option<SaveOutcome>,
    pub error: Option<String>,
}
