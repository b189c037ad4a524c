//! Error types for document-store operations.

use thiserror::Error;

/// Errors raised by the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No document exists for the given natural key.
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    /// A stored value could not be interpreted (state/key drift).
    #[error("corrupt row for {key}: {reason}")]
    CorruptRow {
        /// Natural key of the offending row.
        key: String,
        /// What failed to parse.
        reason: String,
    },
}
