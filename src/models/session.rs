use serde::{Deserialize, Serialize};

use super::ArticleIdentity;

/// What a measurement session is bound to: one article instance on an order,
/// one size, one operator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub article: ArticleIdentity,
    /// Purchase-order article line being inspected.
    pub order_line_id: i64,
    pub size: String,
    pub operator_id: String,
}

impl SessionContext {
    pub fn same_target(&self, other: &SessionContext) -> bool {
        self.order_line_id == other.order_line_id
            && self.article == other.article
            && self.size.trim().eq_ignore_ascii_case(other.size.trim())
    }
}
