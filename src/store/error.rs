//! Error types for ledger operations.

use thiserror::Error;

/// Errors from ledger persistence operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database failure (I/O, busy, constraint violation).
    #[error("ledger database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An update targeted a record id that does not exist.
    #[error("download record not found: {0}")]
    RecordNotFound(i64),
}
