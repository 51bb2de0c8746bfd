use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::db::{Database, MeasurementResult};
use crate::error::{QcError, QcResult};
use crate::models::{MeasurementSpecification, ToleranceOverride};

use super::reconcile::{calculate_status, effective_tolerances, parse_value};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

/// One specification's current value and effective tolerances.
#[derive(Debug, Clone)]
pub struct SaveItem {
    pub spec: MeasurementSpecification,
    pub value: Option<String>,
    pub tolerance_override: Option<ToleranceOverride>,
}

/// Everything needed to write one session's results.
#[derive(Debug, Clone)]
pub struct SaveBatch {
    pub order_line_id: i64,
    pub size: String,
    pub article_style: String,
    pub operator_id: String,
    pub items: Vec<SaveItem>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub success: bool,
    /// Rows inserted or changed.
    pub written: usize,
    /// Rows that already held the same value, tolerances and status.
    pub unchanged: usize,
    pub failed: usize,
    pub error: Option<String>,
    pub saved_at: DateTime<Utc>,
}

/// Single writer for `measurement_results`.
///
/// Saves queue on one lock. The batch is taken from the caller only once the
/// lock is held, so a save that waited behind another one writes the newest
/// values instead of the ones current when it was requested.
#[derive(Clone)]
pub struct ResultPersister {
    db: Database,
    writer: Arc<Mutex<()>>,
}

impl ResultPersister {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            writer: Arc::new(Mutex::new(())),
        }
    }

    #[cfg(test)]
    async fn save(&self, batch: SaveBatch) -> SaveOutcome {
        let _writer = self.writer.lock().await;
        self.write_batch(batch).await
    }

    /// Takes the lock, then asks `snapshot` for the batch. `None` from the
    /// snapshot means there is nothing left to save. The tag travels back
    /// with the outcome untouched.
    pub async fn save_latest<F, Fut, T>(&self, snapshot: F) -> Option<(T, SaveOutcome)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<(T, SaveBatch)>>,
    {
        let _writer = self.writer.lock().await;
        let (tag, batch) = snapshot().await?;
        Some((tag, self.write_batch(batch).await))
    }

    /// Stored rows for an order line in one size.
    pub async fn load(&self, order_line_id: i64, size: &str) -> QcResult<Vec<MeasurementResult>> {
        self.db
            .get_measurement_results(order_line_id, size)
            .await
            .map_err(|err| QcError::PersistenceFailure(format!("{err:#}")))
    }

    async fn write_batch(&self, batch: SaveBatch) -> SaveOutcome {
        let mut written = 0;
        let mut unchanged = 0;
        let mut failed = 0;
        let mut first_error = None;

        for item in &batch.items {
            let record = to_record(&batch, item);
            match self.db.upsert_measurement_result(&record).await {
                Ok(true) => written += 1,
                Ok(false) => unchanged += 1,
                Err(err) => {
                    failed += 1;
                    log_error!(
                        "Failed to save measurement {} ({}) for order line {} size {}: {err:#}",
                        item.spec.id,
                        item.spec.code,
                        batch.order_line_id,
                        batch.size
                    );
                    first_error.get_or_insert_with(|| {
                        QcError::PersistenceFailure(format!(
                            "measurement {}: {err:#}",
                            item.spec.code
                        ))
                        .to_string()
                    });
                }
            }
        }

        if written > 0 {
            log_info!(
                "Saved {written} of {} measurements for {} size {} (order line {})",
                batch.items.len(),
                batch.article_style,
                batch.size,
                batch.order_line_id
            );
        }

        SaveOutcome {
            success: failed == 0,
            written,
            unchanged,
            failed,
            error: first_error,
            saved_at: Utc::now(),
        }
    }
}

fn to_record(batch: &SaveBatch, item: &SaveItem) -> MeasurementResult {
    let (tolerance_plus, tolerance_minus) =
        effective_tolerances(&item.spec, item.tolerance_override.as_ref());

    MeasurementResult {
        order_line_id: batch.order_line_id,
        measurement_id: item.spec.id,
        size: batch.size.clone(),
        article_style: batch.article_style.clone(),
        measured_value: item.value.as_deref().and_then(parse_value),
        expected_value: item.spec.expected_value,
        tolerance_plus,
        tolerance_minus,
        status: calculate_status(
            &item.spec,
            item.value.as_deref(),
            item.tolerance_override.as_ref(),
        ),
        operator_id: batch.operator_id.clone(),
        updated_at: Utc::now(),
    }
}
