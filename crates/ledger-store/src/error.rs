use thiserror::Error;

/// Errors that can occur when interacting with the stock and ledger storage.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store cannot be reached.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A write was rejected because the data breaks a storage invariant
    /// (zero change, negative quantity, mismatched keys in a batch).
    #[error("Invalid ledger entry: {0}")]
    InvalidEntry(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;
