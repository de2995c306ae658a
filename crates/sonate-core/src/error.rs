//! Error types for the SONATE core.

use thiserror::Error;

/// Errors raised while producing canonical bytes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CanonicalizationError {
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    #[error("value nested deeper than {max} levels")]
    TooDeep { max: usize },
}

/// Errors raised while constructing or storing chain links.
#[derive(Debug, Error)]
pub enum ChainIntegrityError {
    #[error("malformed hash: {0:?}")]
    MalformedHash(String),

    #[error("canonicalization failed: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    #[error("store error: {0}")]
    Store(String),
}

/// Errors raised while parsing key material.
///
/// Verification itself never returns these; it reports `false`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("malformed key: {0}")]
    MalformedKey(String),

    #[error("signing key unavailable")]
    KeyUnavailable,
}

/// Errors raised by the Merkle ledger.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MerkleError {
    #[error("cannot build a Merkle tree from an empty leaf set")]
    EmptyLeafSet,

    #[error("leaf not found in tree: {0}")]
    LeafNotFound(String),
}

/// Umbrella error for callers that mix core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Canonicalization(#[from] CanonicalizationError),

    #[error(transparent)]
    Chain(#[from] ChainIntegrityError),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Merkle(#[from] MerkleError),
}

pub type Result<T> = std::result::Result<T, CoreError>;
