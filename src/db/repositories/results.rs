use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{normalize_size, parse_datetime, parse_status},
    models::MeasurementResult,
};

fn row_to_result(row: &Row) -> Result<MeasurementResult> {
    let status: String = row.get("status")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(MeasurementResult {
        order_line_id: row.get("purchase_order_article_id")?,
        measurement_id: row.get("measurement_id")?,
        size: row.get("size")?,
        article_style: row.get("article_style")?,
        measured_value: row.get("measured_value")?,
        expected_value: row.get("expected_value")?,
        tolerance_plus: row.get("tol_plus")?,
        tolerance_minus: row.get("tol_minus")?,
        status: parse_status(&status)?,
        operator_id: row.get("operator_id")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

impl Database {
    /// Insert or update one result row.
    ///
    /// Returns `false` when the stored row already holds the same value,
    /// tolerances and status; such saves leave the row untouched.
    pub async fn upsert_measurement_result(&self, result: &MeasurementResult) -> Result<bool> {
        let record = result.clone();
        self.execute(move |conn| {
            let now = Utc::now().to_rfc3339();
            let changed = conn.execute(
                "INSERT INTO measurement_results (
                     purchase_order_article_id, measurement_id, size, article_style,
                     measured_value, expected_value, tol_plus, tol_minus, status,
                     operator_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
                 ON CONFLICT(purchase_order_article_id, measurement_id, size) DO UPDATE SET
                     measured_value = excluded.measured_value,
                     expected_value = excluded.expected_value,
                     tol_plus = excluded.tol_plus,
                     tol_minus = excluded.tol_minus,
                     status = excluded.status,
                     operator_id = excluded.operator_id,
                     updated_at = excluded.updated_at
                 WHERE measurement_results.measured_value IS NOT excluded.measured_value
                    OR measurement_results.tol_plus IS NOT excluded.tol_plus
                    OR measurement_results.tol_minus IS NOT excluded.tol_minus
                    OR measurement_results.status IS NOT excluded.status",
                params![
                    record.order_line_id,
                    record.measurement_id,
                    normalize_size(&record.size),
                    record.article_style,
                    record.measured_value,
                    record.expected_value,
                    record.tolerance_plus,
                    record.tolerance_minus,
                    record.status.as_str(),
                    record.operator_id,
                    now,
                ],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    /// Stored results for an order line in one size, in measurement order.
    pub async fn get_measurement_results(
        &self,
        order_line_id: i64,
        size: &str,
    ) -> Result<Vec<MeasurementResult>> {
        let size = normalize_size(size);
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT purchase_order_article_id, measurement_id, size, article_style,
                        measured_value, expected_value, tol_plus, tol_minus, status,
                        operator_id, updated_at
                 FROM measurement_results
                 WHERE purchase_order_article_id = ?1 AND size = ?2
                 ORDER BY measurement_id ASC",
            )?;

            let mut rows = stmt.query(params![order_line_id, size])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_result(row)?);
            }

            Ok(results)
        })
        .await
    }
}
