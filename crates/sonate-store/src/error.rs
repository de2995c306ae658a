//! Error types for the store module.

use sonate_core::ChainIntegrityError;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Metadata could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A stored row does not decode into a link.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A previous holder of the connection panicked.
    #[error("connection mutex poisoned")]
    Poisoned,
}

impl From<StoreError> for ChainIntegrityError {
    fn from(e: StoreError) -> Self {
        ChainIntegrityError::Store(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
