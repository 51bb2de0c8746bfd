use magicqc_lib::db::Database;
use magicqc_lib::models::{ArticleIdentity, SessionContext};
use tempfile::TempDir;

const CATALOG_SEED: &str = "
    INSERT INTO brands (id, name) VALUES (1, 'Nike');
    INSERT INTO article_types (id, name) VALUES (10, 'T-Shirt');
    INSERT INTO articles (id, brand_id, article_type_id, article_style)
    VALUES (100, 1, 10, 'NKE-TS-001');
    INSERT INTO measurements (id, article_id, code, measurement, tol_plus, tol_minus)
    VALUES (1000, 100, 'A', 'Chest width', 1.0, 1.0),
           (1001, 100, 'B', 'Body length', 1.0, 2.0);
    INSERT INTO measurement_sizes (measurement_id, size, value)
    VALUES (1000, 'L', 52.0), (1000, 'M', 50.0),
           (1001, 'L', 70.0), (1001, 'M', 68.0);
    INSERT INTO purchase_orders (id, po_number, brand_id) VALUES (1, 'PO-1', 1);
    INSERT INTO purchase_order_articles (id, purchase_order_id, article_type_id, article_style)
    VALUES (11, 1, 10, 'NKE-TS-001');
";

/// Throwaway database holding one article with two measurements in sizes M and L.
pub async fn seeded_db() -> (TempDir, Database) {
    let dir = tempfile::tempdir().expect("temp dir");
    let db = Database::new(dir.path().join("qc.sqlite3")).expect("open database");
    db.execute(|conn| {
        conn.execute_batch(CATALOG_SEED)?;
        Ok(())
    })
    .await
    .expect("seed catalog");
    (dir, db)
}

pub fn context(size: &str) -> SessionContext {
    SessionContext {
        article: ArticleIdentity {
            brand_id: 1,
            article_type_id: 10,
            article_style: "NKE-TS-001".into(),
            article_id: None,
        },
        order_line_id: 11,
        size: size.into(),
        operator_id: "operator-1".into(),
    }
}
