//! Error taxonomy for the QC workflow.
//!
//! Every variant is recoverable from the operator's point of view: the
//! controller turns it into panel state or a banner instead of propagating it
//! past a command boundary.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum QcError {
    /// No resolution strategy produced specifications for the article+size.
    #[error("no measurement specifications found for {article} (size {size})")]
    ResolutionEmpty { article: String, size: String },

    /// Keypoints or reference image missing/unparseable.
    #[error("malformed annotation: {0}")]
    MalformedAnnotation(String),

    /// Transport-level failure talking to the measurement engine.
    #[error("measurement engine unreachable: {0}")]
    EngineUnreachable(String),

    /// The engine answered but refused the request.
    #[error("measurement engine rejected request: {0}")]
    EngineRejected(String),

    /// Transport-level failure talking to the annotation/catalog API.
    #[error("catalog service unavailable: {0}")]
    CatalogUnavailable(String),

    /// A save batch failed; in-memory values are kept for a retry.
    #[error("failed to save measurements: {0}")]
    PersistenceFailure(String),

    /// The action is not allowed in the current session phase.
    #[error("{0}")]
    PreconditionViolation(String),
}

impl QcError {
    pub fn precondition(message: impl Into<String>) -> Self {
        QcError::PreconditionViolation(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        QcError::MalformedAnnotation(message.into())
    }

    /// Failures that warrant the one-shot engine restart before giving up.
    pub fn is_engine_failure(&self) -> bool {
        matches!(
            self,
            QcError::EngineUnreachable(_) | QcError::EngineRejected(_)
        )
    }
}

pub type QcResult<T> = std::result::Result<T, QcError>;
