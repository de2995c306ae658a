//! In-memory [`TimestampAnchor`] for tests.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use sonate_core::{
    now_millis, AnchorError, AnchorStatus, PendingProof, Sha256Hash, TimestampAnchor,
};

/// An anchor service that confirms submissions when told to.
#[derive(Default)]
pub struct MemoryAnchor {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    next: u64,
    statuses: HashMap<String, AnchorStatus>,
    offline: bool,
}

impl MemoryAnchor {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every call fail with `Unavailable` until set back.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Confirm a pending submission at `location`.
    pub fn confirm(&self, proof: &PendingProof, location: impl Into<String>) -> bool {
        self.resolve(
            proof,
            AnchorStatus::Confirmed {
                location: location.into(),
                confirmed_at: now_millis(),
            },
        )
    }

    /// Fail a pending submission.
    pub fn fail(&self, proof: &PendingProof, reason: impl Into<String>) -> bool {
        self.resolve(
            proof,
            AnchorStatus::Failed {
                reason: reason.into(),
            },
        )
    }

    fn resolve(&self, proof: &PendingProof, status: AnchorStatus) -> bool {
        match self.state().statuses.get_mut(&proof.receipt) {
            Some(current) => {
                *current = status;
                true
            }
            None => false,
        }
    }
}

impl TimestampAnchor for MemoryAnchor {
    fn submit(&self, hash: &Sha256Hash) -> Result<PendingProof, AnchorError> {
        let mut state = self.state();
        if state.offline {
            return Err(AnchorError::Unavailable("memory anchor offline".into()));
        }
        state.next += 1;
        let receipt = format!("mem-{}", state.next);
        state.statuses.insert(receipt.clone(), AnchorStatus::Pending);
        Ok(PendingProof {
            hash: *hash,
            receipt,
            submitted_at: now_millis(),
        })
    }

    fn check_confirmation(&self, proof: &PendingProof) -> Result<AnchorStatus, AnchorError> {
        let state = self.state();
        if state.offline {
            return Err(AnchorError::Unavailable("memory anchor offline".into()));
        }
        state
            .statuses
            .get(&proof.receipt)
            .cloned()
            .ok_or_else(|| AnchorError::UnknownReceipt(proof.receipt.clone()))
    }
}
