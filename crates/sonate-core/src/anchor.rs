//! External timestamp anchoring.
//!
//! An anchor service (a transparency log, a timestamping authority, a public
//! ledger) is an opaque collaborator. The audit chain hands it a finished
//! hash and later asks whether the anchor was confirmed; it never waits on
//! it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::Sha256Hash;
use crate::types::UnixMillis;

/// Errors reported by an anchor service.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnchorError {
    #[error("anchor service unavailable: {0}")]
    Unavailable(String),

    #[error("unknown anchor receipt: {0}")]
    UnknownReceipt(String),
}

/// Handle returned when a hash is submitted for anchoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingProof {
    pub hash: Sha256Hash,
    /// Service-specific receipt identifier.
    pub receipt: String,
    pub submitted_at: UnixMillis,
}

/// Confirmation state of a submitted hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnchorStatus {
    Pending,
    Confirmed {
        /// Service-specific location of the anchor (block, log index, ...).
        location: String,
        confirmed_at: UnixMillis,
    },
    Failed {
        reason: String,
    },
}

/// A timestamping service that can anchor a hash.
pub trait TimestampAnchor: Send + Sync {
    /// Submit a hash for anchoring.
    fn submit(&self, hash: &Sha256Hash) -> Result<PendingProof, AnchorError>;

    /// Ask whether a previous submission has been confirmed.
    fn check_confirmation(&self, proof: &PendingProof) -> Result<AnchorStatus, AnchorError>;
}
