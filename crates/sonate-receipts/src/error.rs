//! Error types for receipt assembly and the collaboration ledger.

use sonate_core::{
    CanonicalizationError, ChainIntegrityError, CoreError, MerkleError, SignatureError,
};
use sonate_store::StoreError;
use thiserror::Error;

/// A receipt document does not have the required shape.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("receipt is not a JSON object")]
    NotAnObject,

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid field {path}: {reason}")]
    InvalidField { path: String, reason: String },
}

/// Errors that can occur while assembling receipts or keeping a ledger.
#[derive(Debug, Error)]
pub enum ReceiptError {
    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    #[error("chain error: {0}")]
    Chain(#[from] ChainIntegrityError),

    #[error("signature error: {0}")]
    Signature(#[from] SignatureError),

    #[error("merkle error: {0}")]
    Merkle(#[from] MerkleError),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A work unit was logged for an agent that was never registered.
    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    /// A decision referenced a work unit the ledger does not hold.
    #[error("unknown work unit: {0}")]
    UnknownWorkUnit(String),

    #[error("unknown export format: {0}")]
    UnknownFormat(String),
}

impl From<CoreError> for ReceiptError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Canonicalization(e) => Self::Canonicalization(e),
            CoreError::Chain(e) => Self::Chain(e),
            CoreError::Signature(e) => Self::Signature(e),
            CoreError::Merkle(e) => Self::Merkle(e),
        }
    }
}

/// Result type for receipt operations.
pub type Result<T> = std::result::Result<T, ReceiptError>;
