use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Key used to look up the specifications of a garment article.
///
/// `article_id` is only known when the operator picked a catalog article
/// directly; purchase-order flows usually carry just the triple.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArticleIdentity {
    pub brand_id: i64,
    pub article_type_id: i64,
    pub article_style: String,
    #[serde(default)]
    pub article_id: Option<i64>,
}

impl fmt::Display for ArticleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "article '{}' (brand {}, type {}",
            self.article_style, self.brand_id, self.article_type_id
        )?;
        if let Some(article_id) = self.article_id {
            write!(f, ", id {article_id}")?;
        }
        write!(f, ")")
    }
}

/// One expected measurement for an article in a given size.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementSpecification {
    pub id: i64,
    pub code: String,
    pub description: String,
    pub size: String,
    pub expected_value: f64,
    pub tolerance_plus: f64,
    pub tolerance_minus: f64,
    pub unit: String,
}

/// Session-scoped tolerance edit. Never written back to the catalog.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToleranceOverride {
    pub spec_id: i64,
    pub tolerance_plus: f64,
    pub tolerance_minus: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum MeasurementStatus {
    Pending,
    Pass,
    Fail,
}

impl MeasurementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementStatus::Pending => "PENDING",
            MeasurementStatus::Pass => "PASS",
            MeasurementStatus::Fail => "FAIL",
        }
    }
}

impl Default for MeasurementStatus {
    fn default() -> Self {
        MeasurementStatus::Pending
    }
}

/// Specification id -> display-formatted value. Missing entries are pending.
pub type MeasuredValues = BTreeMap<i64, String>;

/// Specification id -> tolerance override.
pub type ToleranceOverrides = BTreeMap<i64, ToleranceOverride>;
