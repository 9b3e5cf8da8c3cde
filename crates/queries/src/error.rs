//! Query error types.

use thiserror::Error;

/// Errors that can occur while answering a read.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The stock store failed.
    #[error("Stock store error: {0}")]
    Store(#[from] ledger_store::StoreError),

    /// The item catalog could not be read.
    #[error("Item catalog error: {0}")]
    Catalog(#[from] sqlx::Error),
}

/// Result type for query operations.
pub type Result<T> = std::result::Result<T, QueryError>;
