use std::fmt;

use lending_store::StoreError;
use lending_types::{ActorId, CatalogId, LoanId, RequestKind, TypeError};

/// The kind of entity a [`LendingError::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Title,
    Request,
    Loan,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Title => "title",
            Self::Request => "request",
            Self::Loan => "loan",
        })
    }
}

/// Errors produced by lending operations.
///
/// Everything except [`ConsistencyFault`](Self::ConsistencyFault) and
/// [`StoreFailure`](Self::StoreFailure) is an ordinary business rejection.
/// In every case the surrounding transaction was rolled back.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LendingError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: Entity, key: String },

    #[error("reader {requester} already has an outstanding {kind} request for {catalog}")]
    DuplicateRequest {
        requester: ActorId,
        catalog: CatalogId,
        kind: RequestKind,
    },

    #[error("no copies of {catalog} available")]
    OutOfStock { catalog: CatalogId },

    #[error("reader {requester} has no active loan of {catalog}")]
    NoActiveLoan {
        requester: ActorId,
        catalog: CatalogId,
    },

    #[error("{loan} was already returned")]
    AlreadyReturned { loan: LoanId },

    #[error("reader {requester} already holds an active loan of {catalog}")]
    DuplicateLoan {
        requester: ActorId,
        catalog: CatalogId,
    },

    /// An invariant was about to be broken. Indicates a bug or corrupt data.
    #[error("consistency fault: {0}")]
    ConsistencyFault(String),

    /// The backing store could not complete the transaction.
    #[error("store failure: {0}")]
    StoreFailure(#[from] StoreError),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("validation error: {0}")]
    Validation(#[from] TypeError),
}

impl LendingError {
    pub fn not_found(entity: Entity, key: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Stable machine-readable label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::DuplicateRequest { .. } => "duplicate_request",
            Self::OutOfStock { .. } => "out_of_stock",
            Self::NoActiveLoan { .. } => "no_active_loan",
            Self::AlreadyReturned { .. } => "already_returned",
            Self::DuplicateLoan { .. } => "duplicate_loan",
            Self::ConsistencyFault(_) => "consistency_fault",
            Self::StoreFailure(_) => "store_failure",
            Self::InvalidOperation(_) => "invalid_operation",
            Self::Validation(_) => "validation",
        }
    }

    /// `true` for bugs and infrastructure failures, which are logged.
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::ConsistencyFault(_) | Self::StoreFailure(_))
    }

    /// `true` for ordinary rejections reported back with a reason.
    pub fn is_business_rejection(&self) -> bool {
        !self.is_fault()
    }
}

/// Result alias for lending operations.
pub type LendingResult<T> = Result<T, LendingError>;
