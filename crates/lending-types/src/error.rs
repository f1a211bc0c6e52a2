use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid catalog id {id:?}: {reason}")]
    InvalidCatalogId { id: String, reason: String },

    #[error("invalid role: {0}")]
    InvalidRole(String),

    #[error("invalid request kind: {0}")]
    InvalidRequestKind(String),

    #[error("invalid loan status: {0}")]
    InvalidLoanStatus(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),
}
