use log::{error, info, warn};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::{
    repositories::catalog::{
        find_article_with_size, order_line_triple, sizes_for_article, specifications_for_article,
    },
    ArticleMatch, ArticleTriple, Database,
};
use crate::models::{ArticleIdentity, MeasurementSpecification};

use super::sizes::sort_by_ladder;

/// Input of a specification lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveContext {
    pub article: ArticleIdentity,
    pub size: String,
    /// Purchase-order article line; when present its triple drives the
    /// fallback strategies instead of the identity's own fields.
    #[serde(default)]
    pub order_line_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ResolutionStrategy {
    DirectArticle,
    ExactTriple,
    BrandAndType,
    TypeOnly,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub specs: Vec<MeasurementSpecification>,
    pub available_sizes: Vec<String>,
    pub article_id: Option<i64>,
    pub strategy: Option<ResolutionStrategy>,
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

const FALLBACKS: [(ResolutionStrategy, ArticleMatch); 3] = [
    (ResolutionStrategy::ExactTriple, ArticleMatch::BrandTypeStyle),
    (ResolutionStrategy::BrandAndType, ArticleMatch::BrandType),
    (ResolutionStrategy::TypeOnly, ArticleMatch::TypeOnly),
];

/// Finds the measurement specifications that apply to an article in a size.
#[derive(Clone)]
pub struct SpecResolver {
    db: Database,
}

impl SpecResolver {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Runs the strategy chain. Never fails: lookup errors and misses both
    /// come back as an empty resolution, logged with the size and identity.
    pub async fn resolve(&self, ctx: &ResolveContext) -> Resolution {
        let query_ctx = ctx.clone();
        match self
            .db
            .execute(move |conn| resolve_with(conn, &query_ctx))
            .await
        {
            Ok(Some(resolution)) => {
                info!(
                    "Resolved {} specifications for size '{}' of {} via {:?} (article {:?})",
                    resolution.specs.len(),
                    ctx.size,
                    ctx.article,
                    resolution.strategy,
                    resolution.article_id
                );
                resolution
            }
            Ok(None) => {
                warn!(
                    "No measurement specifications for size '{}' of {} (order line {:?})",
                    ctx.size, ctx.article, ctx.order_line_id
                );
                Resolution::default()
            }
            Err(err) => {
                error!(
                    "Specification lookup failed for size '{}' of {} (order line {:?}): {err:#}",
                    ctx.size, ctx.article, ctx.order_line_id
                );
                Resolution::default()
            }
        }
    }

    /// Ladder-ordered sizes of a catalog article, for the size selector.
    pub async fn list_sizes(&self, article_id: i64) -> Vec<String> {
        match self.db.get_article_sizes(article_id).await {
            Ok(mut sizes) => {
                sort_by_ladder(&mut sizes);
                sizes
            }
            Err(err) => {
                error!("Failed to list sizes for article {article_id}: {err:#}");
                Vec::new()
            }
        }
    }
}

fn resolve_with(conn: &Connection, ctx: &ResolveContext) -> anyhow::Result<Option<Resolution>> {
    if let Some(article_id) = ctx.article.article_id {
        let specs = specifications_for_article(conn, article_id, &ctx.size)?;
        if !specs.is_empty() {
            return finish(conn, ResolutionStrategy::DirectArticle, article_id, specs).map(Some);
        }
    }

    let order_triple = match ctx.order_line_id {
        Some(order_line_id) => order_line_triple(conn, order_line_id)?,
        None => None,
    };
    let triple = order_triple.unwrap_or_else(|| ArticleTriple {
        brand_id: ctx.article.brand_id,
        article_type_id: ctx.article.article_type_id,
        article_style: ctx.article.article_style.clone(),
    });

    for (strategy, mode) in FALLBACKS {
        let Some(article_id) = find_article_with_size(conn, &triple, mode, &ctx.size)? else {
            continue;
        };
        let specs = specifications_for_article(conn, article_id, &ctx.size)?;
        if !specs.is_empty() {
            return finish(conn, strategy, article_id, specs).map(Some);
        }
    }

    Ok(None)
}

fn finish(
    conn: &Connection,
    strategy: ResolutionStrategy,
    article_id: i64,
    specs: Vec<MeasurementSpecification>,
) -> anyhow::Result<Resolution> {
    let mut available_sizes = sizes_for_article(conn, article_id)?;
    sort_by_ladder(&mut available_sizes);

    Ok(Resolution {
        specs,
        available_sizes,
        article_id: Some(article_id),
        strategy: Some(strategy),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    pub(crate) const CATALOG_SEED: &str = "
        INSERT INTO brands (id, name) VALUES (1, 'Nike'), (2, 'Adidas'), (3, 'Puma');
        INSERT INTO article_types (id, name) VALUES (10, 'T-Shirt'), (20, 'Polo');

        INSERT INTO articles (id, brand_id, article_type_id, article_style)
        VALUES (100, 1, 10, 'NKE-TS-001'),
               (101, 1, 10, 'NKE-TS-002'),
               (200, 2, 20, 'ADD-PL-001');

        INSERT INTO measurements (id, article_id, code, measurement, tol_plus, tol_minus)
        VALUES (1000, 100, 'A', 'Chest width', 1.0, 1.0),
               (1001, 100, 'B', 'Body length', 1.0, 2.0),
               (1100, 101, 'A', 'Chest width', 0.5, 0.5),
               (2000, 200, 'A', 'Chest width', 1.0, 1.0);

        INSERT INTO measurement_sizes (measurement_id, size, value)
        VALUES (1000, 'L', 52.0), (1000, 'XS', 46.0), (1000, 'XXL', 56.0),
               (1001, 'L', 70.0), (1001, 'XS', 64.0), (1001, 'XXL', 74.0),
               (1100, 'L', 53.0),
               (2000, 'M', 60.0);

        INSERT INTO purchase_orders (id, po_number, brand_id)
        VALUES (1, 'PO-1', 1), (2, 'PO-2', 3);

        INSERT INTO purchase_order_articles (id, purchase_order_id, article_type_id, article_style)
        VALUES (11, 1, 10, 'NKE-TS-001'),
               (12, 1, 10, 'NKE-TS-001-B'),
               (13, 2, 20, 'ADD-PL-001');
    ";

    pub(crate) async fn seeded_db() -> (TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("qc.sqlite3")).unwrap();
        db.execute(|conn| {
            conn.execute_batch(CATALOG_SEED)?;
            Ok(())
        })
        .await
        .unwrap();
        (dir, db)
    }

    fn ctx(article_id: Option<i64>, order_line_id: Option<i64>, size: &str) -> ResolveContext {
        ResolveContext {
            article: ArticleIdentity {
                brand_id: 1,
                article_type_id: 10,
                article_style: "NKE-TS-001".into(),
                article_id,
            },
            size: size.into(),
            order_line_id,
        }
    }

    fn spec_ids(resolution: &Resolution) -> Vec<i64> {
        resolution.specs.iter().map(|spec| spec.id).collect()
    }

    #[tokio::test]
    async fn direct_article_beats_conflicting_triple() {
        let (_dir, db) = seeded_db().await;
        let resolver = SpecResolver::new(db);

        let resolution = resolver.resolve(&ctx(Some(101), Some(11), "L")).await;

        assert_eq!(resolution.strategy, Some(ResolutionStrategy::DirectArticle));
        assert_eq!(resolution.article_id, Some(101));
        assert_eq!(spec_ids(&resolution), vec![1100]);
    }

    #[tokio::test]
    async fn exact_triple_match_orders_specs_and_sizes() {
        let (_dir, db) = seeded_db().await;
        let resolver = SpecResolver::new(db);

        let resolution = resolver.resolve(&ctx(None, Some(11), " l ")).await;

        assert_eq!(resolution.strategy, Some(ResolutionStrategy::ExactTriple));
        assert_eq!(resolution.article_id, Some(100));
        assert_eq!(spec_ids(&resolution), vec![1000, 1001]);
        assert_eq!(resolution.specs[1].expected_value, 70.0);
        assert_eq!(resolution.specs[1].tolerance_minus, 2.0);
        assert_eq!(resolution.available_sizes, vec!["XS", "L", "XXL"]);
    }

    #[tokio::test]
    async fn direct_article_without_size_falls_through() {
        let (_dir, db) = seeded_db().await;
        let resolver = SpecResolver::new(db);

        let resolution = resolver.resolve(&ctx(Some(101), Some(11), "XS")).await;

        assert_eq!(resolution.strategy, Some(ResolutionStrategy::ExactTriple));
        assert_eq!(resolution.article_id, Some(100));
    }

    #[tokio::test]
    async fn style_drift_uses_brand_and_type() {
        let (_dir, db) = seeded_db().await;
        let resolver = SpecResolver::new(db);

        let resolution = resolver.resolve(&ctx(None, Some(12), "XS")).await;

        assert_eq!(resolution.strategy, Some(ResolutionStrategy::BrandAndType));
        assert_eq!(resolution.article_id, Some(100));
    }

    #[tokio::test]
    async fn broken_brand_link_uses_type_only() {
        let (_dir, db) = seeded_db().await;
        let resolver = SpecResolver::new(db);

        let resolution = resolver.resolve(&ctx(None, Some(13), "m")).await;

        assert_eq!(resolution.strategy, Some(ResolutionStrategy::TypeOnly));
        assert_eq!(resolution.article_id, Some(200));
        assert_eq!(spec_ids(&resolution), vec![2000]);
    }

    #[tokio::test]
    async fn identity_triple_used_without_order_line() {
        let (_dir, db) = seeded_db().await;
        let resolver = SpecResolver::new(db);

        let resolution = resolver.resolve(&ctx(None, None, "XXL")).await;

        assert_eq!(resolution.strategy, Some(ResolutionStrategy::ExactTriple));
        assert_eq!(resolution.specs[0].expected_value, 56.0);
    }

    #[tokio::test]
    async fn unknown_size_resolves_empty() {
        let (_dir, db) = seeded_db().await;
        let resolver = SpecResolver::new(db);

        let resolution = resolver.resolve(&ctx(Some(100), Some(11), "5XL")).await;

        assert!(resolution.is_empty());
        assert_eq!(resolution.strategy, None);
        assert!(resolution.available_sizes.is_empty());
    }

    #[tokio::test]
    async fn database_error_resolves_empty() {
        let (_dir, db) = seeded_db().await;
        db.execute(|conn| {
            conn.execute_batch("DROP TABLE measurement_sizes;")?;
            Ok(())
        })
        .await
        .unwrap();
        let resolver = SpecResolver::new(db);

        let resolution = resolver.resolve(&ctx(Some(100), Some(11), "L")).await;

        assert!(resolution.is_empty());
    }

    #[tokio::test]
    async fn list_sizes_follows_ladder() {
        let (_dir, db) = seeded_db().await;
        let resolver = SpecResolver::new(db);

        assert_eq!(resolver.list_sizes(100).await, vec!["XS", "L", "XXL"]);
        assert!(resolver.list_sizes(999).await.is_empty());
    }
}
