//! Read-only queries against the catalog mirror (articles, measurement specs,
//! purchase orders).
//!
//! The synchronous helpers take a borrowed connection so a caller can run
//! several of them inside one worker task.

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::{connection::Database, helpers::normalize_size};
use crate::models::MeasurementSpecification;

/// (brand, article type, style) as declared on an order line.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleTriple {
    pub brand_id: i64,
    pub article_type_id: i64,
    pub article_style: String,
}

/// How strictly a triple must match a catalog article.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleMatch {
    BrandTypeStyle,
    BrandType,
    TypeOnly,
}

fn row_to_specification(row: &Row) -> rusqlite::Result<MeasurementSpecification> {
    Ok(MeasurementSpecification {
        id: row.get("id")?,
        code: row.get("code")?,
        description: row.get("measurement")?,
        size: row.get("size")?,
        expected_value: row.get("value")?,
        tolerance_plus: row.get("tol_plus")?,
        tolerance_minus: row.get("tol_minus")?,
        unit: row.get("unit")?,
    })
}

/// Specifications of one article for one size, in measurement-id order.
///
/// That order is the positional order the measurement engine uses, so it
/// must stay stable for the lifetime of a session.
pub fn specifications_for_article(
    conn: &Connection,
    article_id: i64,
    size: &str,
) -> Result<Vec<MeasurementSpecification>> {
    let mut stmt = conn.prepare(
        "SELECT m.id, m.code, m.measurement, TRIM(ms.size) AS size, ms.value,
                m.tol_plus, m.tol_minus, COALESCE(ms.unit, m.unit) AS unit
         FROM measurements m
         JOIN measurement_sizes ms ON ms.measurement_id = m.id
         WHERE m.article_id = ?1 AND UPPER(TRIM(ms.size)) = ?2
         ORDER BY m.id ASC",
    )?;

    let specs = stmt
        .query_map(params![article_id, normalize_size(size)], row_to_specification)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(specs)
}

/// Order line triple, with the brand taken from the parent purchase order.
pub fn order_line_triple(conn: &Connection, order_line_id: i64) -> Result<Option<ArticleTriple>> {
    let triple = conn
        .query_row(
            "SELECT po.brand_id, poa.article_type_id, poa.article_style
             FROM purchase_order_articles poa
             JOIN purchase_orders po ON po.id = poa.purchase_order_id
             WHERE poa.id = ?1",
            params![order_line_id],
            |row| {
                Ok(ArticleTriple {
                    brand_id: row.get(0)?,
                    article_type_id: row.get(1)?,
                    article_style: row.get(2)?,
                })
            },
        )
        .optional()?;

    Ok(triple)
}

/// Lowest-id catalog article matching `triple` under `mode` that has
/// measurement rows for `size`.
pub fn find_article_with_size(
    conn: &Connection,
    triple: &ArticleTriple,
    mode: ArticleMatch,
    size: &str,
) -> Result<Option<i64>> {
    const HAS_SIZE: &str = "EXISTS (
            SELECT 1 FROM measurements m
            JOIN measurement_sizes ms ON ms.measurement_id = m.id
            WHERE m.article_id = a.id AND UPPER(TRIM(ms.size)) = :size
        )";

    let size = normalize_size(size);
    let article_id = match mode {
        ArticleMatch::BrandTypeStyle => conn
            .query_row(
                &format!(
                    "SELECT a.id FROM articles a
                     WHERE a.brand_id = :brand AND a.article_type_id = :type
                       AND a.article_style = :style AND {HAS_SIZE}
                     ORDER BY a.id ASC LIMIT 1"
                ),
                rusqlite::named_params! {
                    ":brand": triple.brand_id,
                    ":type": triple.article_type_id,
                    ":style": triple.article_style,
                    ":size": size,
                },
                |row| row.get(0),
            )
            .optional()?,
        ArticleMatch::BrandType => conn
            .query_row(
                &format!(
                    "SELECT a.id FROM articles a
                     WHERE a.brand_id = :brand AND a.article_type_id = :type AND {HAS_SIZE}
                     ORDER BY a.id ASC LIMIT 1"
                ),
                rusqlite::named_params! {
                    ":brand": triple.brand_id,
                    ":type": triple.article_type_id,
                    ":size": size,
                },
                |row| row.get(0),
            )
            .optional()?,
        ArticleMatch::TypeOnly => conn
            .query_row(
                &format!(
                    "SELECT a.id FROM articles a
                     WHERE a.article_type_id = :type AND {HAS_SIZE}
                     ORDER BY a.id ASC LIMIT 1"
                ),
                rusqlite::named_params! {
                    ":type": triple.article_type_id,
                    ":size": size,
                },
                |row| row.get(0),
            )
            .optional()?,
    };

    Ok(article_id)
}

/// Distinct sizes of an article in the order the store first lists them.
pub fn sizes_for_article(conn: &Connection, article_id: i64) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT TRIM(ms.size) AS size
         FROM measurements m
         JOIN measurement_sizes ms ON ms.measurement_id = m.id
         WHERE m.article_id = ?1
         GROUP BY UPPER(TRIM(ms.size))
         ORDER BY MIN(ms.id) ASC",
    )?;

    let sizes = stmt
        .query_map(params![article_id], |row| row.get::<_, String>("size"))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(sizes)
}

impl Database {
    pub async fn get_article_sizes(&self, article_id: i64) -> Result<Vec<String>> {
        self.execute(move |conn| sizes_for_article(conn, article_id))
            .await
    }
}
