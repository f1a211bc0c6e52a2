use lending_types::TenantId;

/// Errors from store operations.
///
/// Any of these means the transaction could not do what was asked; the
/// caller drops the transaction and nothing staged in it is published.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A lock guarding tenant data was poisoned by a panicking writer.
    #[error("store lock poisoned: {0}")]
    Poisoned(String),

    /// An insert would break one of the store's uniqueness constraints.
    #[error("unique constraint {constraint} violated for {key}")]
    UniqueViolation {
        constraint: &'static str,
        key: String,
    },

    /// An update targeted a row that does not exist.
    #[error("no {table} row for {key}")]
    MissingRow { table: &'static str, key: String },

    /// A record was written into a transaction scoped to another tenant.
    #[error("record for tenant {record} written in a transaction for tenant {tx}")]
    TenantMismatch { tx: TenantId, record: TenantId },

    /// Another transaction held the title for longer than the lock timeout.
    #[error("timed out after {waited_ms}ms waiting for {catalog} of tenant {tenant}")]
    LockTimeout {
        tenant: TenantId,
        catalog: String,
        waited_ms: u64,
    },

    /// Store configuration is unusable.
    #[error("invalid store configuration: {0}")]
    InvalidConfig(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
