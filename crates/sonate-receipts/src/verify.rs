//! Receipt verification.
//!
//! Every check is independent: a bad signature does not hide a bad chain
//! hash. Problems are reported in the result structs, never as `Err`.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use sonate_core::{verify, PublicKey, Sha256Hash};

use crate::error::SchemaError;
use crate::receipt::{
    chain_seed, compute_chain_hash, content_for_id, signing_bytes, Receipt, GENESIS, UNSIGNED_ID,
};

/// Fields every receipt document must carry, as JSON paths.
pub const REQUIRED_FIELDS: &[&str] = &[
    "id",
    "version",
    "timestamp",
    "mode",
    "session_id",
    "agent_did",
    "human_did",
    "policy_version",
    "interaction",
    "chain",
    "chain.previous_hash",
    "chain.chain_hash",
    "chain.chain_length",
];

/// What to check beyond the receipt's self-consistency.
#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    /// Enables the signature check.
    pub public_key: Option<PublicKey>,
    /// Requires `chain.previous_hash` to equal this value.
    pub expected_previous_hash: Option<String>,
}

impl VerifyOptions {
    pub fn with_public_key(mut self, key: PublicKey) -> Self {
        self.public_key = Some(key);
        self
    }

    pub fn with_previous_hash(mut self, hash: impl Into<String>) -> Self {
        self.expected_previous_hash = Some(hash.into());
        self
    }
}

/// Outcome of verifying one receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptVerification {
    pub schema_valid: bool,
    pub receipt_id_valid: bool,
    pub chain_hash_valid: bool,
    pub signature_present: bool,
    /// `None` when no public key was supplied.
    pub signature_valid: Option<bool>,
    pub issues: Vec<String>,
}

impl ReceiptVerification {
    fn schema_failure(error: &SchemaError, has_key: bool) -> Self {
        Self {
            schema_valid: false,
            receipt_id_valid: false,
            chain_hash_valid: false,
            signature_present: false,
            signature_valid: has_key.then_some(false),
            issues: vec![error.to_string()],
        }
    }

    /// True when every performed check passed.
    pub fn is_valid(&self) -> bool {
        self.failed_checks().is_empty()
    }

    /// Names of the failed checks, in reporting order.
    pub fn failed_checks(&self) -> Vec<&'static str> {
        let mut failed = Vec::new();
        if !self.schema_valid {
            failed.push("schema");
        }
        if !self.receipt_id_valid {
            failed.push("id");
        }
        if !self.chain_hash_valid {
            failed.push("chain hash");
        }
        if self.signature_valid == Some(false) {
            failed.push("signature");
        }
        failed
    }
}

/// Check a raw document's shape and decode it.
///
/// Fails fast on the first missing required field.
pub fn check_receipt_json(value: &Value) -> Result<Receipt, SchemaError> {
    if !value.is_object() {
        return Err(SchemaError::NotAnObject);
    }
    for path in REQUIRED_FIELDS {
        if lookup(value, path).is_none() {
            return Err(SchemaError::MissingField((*path).to_owned()));
        }
    }
    let receipt: Receipt = serde_json::from_value(value.clone()).map_err(|e| {
        SchemaError::InvalidField {
            path: "receipt".to_owned(),
            reason: e.to_string(),
        }
    })?;
    validate_fields(&receipt)?;
    Ok(receipt)
}

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |node, key| node.get(key))
        .filter(|v| !v.is_null())
}

fn invalid(path: &str, reason: &str) -> SchemaError {
    SchemaError::InvalidField {
        path: path.to_owned(),
        reason: reason.to_owned(),
    }
}

fn is_hex32(s: &str) -> bool {
    Sha256Hash::from_hex(s).is_ok()
}

fn validate_fields(receipt: &Receipt) -> Result<(), SchemaError> {
    if receipt.id != UNSIGNED_ID && !is_hex32(&receipt.id) {
        return Err(invalid("id", "expected 64 hex characters or \"unsigned\""));
    }
    if receipt.version.is_empty() {
        return Err(invalid("version", "must not be empty"));
    }
    if DateTime::parse_from_rfc3339(&receipt.timestamp).is_err() {
        return Err(invalid("timestamp", "expected an ISO-8601 timestamp"));
    }
    if receipt.session_id.is_empty() {
        return Err(invalid("session_id", "must not be empty"));
    }
    if receipt.chain.previous_hash != GENESIS && !is_hex32(&receipt.chain.previous_hash) {
        return Err(invalid(
            "chain.previous_hash",
            "expected 64 hex characters or \"GENESIS\"",
        ));
    }
    if !is_hex32(&receipt.chain.chain_hash) {
        return Err(invalid("chain.chain_hash", "expected 64 hex characters"));
    }
    if receipt.chain.chain_length == 0 {
        return Err(invalid("chain.chain_length", "must be at least 1"));
    }
    Ok(())
}

/// Verify a decoded receipt.
pub fn verify_receipt(receipt: &Receipt, options: &VerifyOptions) -> ReceiptVerification {
    match receipt.to_value() {
        Ok(value) => verify_receipt_json(&value, options),
        Err(e) => ReceiptVerification::schema_failure(
            &SchemaError::InvalidField {
                path: "receipt".to_owned(),
                reason: e.to_string(),
            },
            options.public_key.is_some(),
        ),
    }
}

/// Verify a raw receipt document.
///
/// Hashes are recomputed over the document as given, so fields unknown to
/// this crate are still covered.
pub fn verify_receipt_json(value: &Value, options: &VerifyOptions) -> ReceiptVerification {
    let receipt = match check_receipt_json(value) {
        Ok(receipt) => receipt,
        Err(e) => {
            tracing::debug!(error = %e, "receipt failed schema check");
            return ReceiptVerification::schema_failure(&e, options.public_key.is_some());
        }
    };

    let mut issues = Vec::new();

    let content = match content_for_id(value) {
        Ok(content) => Some(content),
        Err(e) => {
            issues.push(format!("cannot canonicalize receipt: {e}"));
            None
        }
    };

    let receipt_id_valid = if receipt.id == UNSIGNED_ID {
        issues.push("receipt is unsigned; its id does not bind its content".to_owned());
        false
    } else {
        let ok = content
            .as_ref()
            .is_some_and(|c| Sha256Hash::hash(c).to_hex() == receipt.id);
        if !ok {
            issues.push("id does not match receipt content".to_owned());
        }
        ok
    };

    let seed = chain_seed(&receipt.chain.previous_hash, &receipt.session_id);
    let mut chain_hash_valid = content
        .as_ref()
        .is_some_and(|c| compute_chain_hash(c, &seed).to_hex() == receipt.chain.chain_hash);
    if !chain_hash_valid {
        issues.push("chain hash does not match receipt content".to_owned());
    }
    if let Some(expected) = &options.expected_previous_hash {
        if &receipt.chain.previous_hash != expected {
            issues.push(format!(
                "previous hash {} does not match expected {expected}",
                receipt.chain.previous_hash
            ));
            chain_hash_valid = false;
        }
    }

    let signature_present = receipt.signature.is_some();
    let signature_valid = options.public_key.as_ref().map(|key| {
        let ok = match (&receipt.signature, signing_bytes(value)) {
            (Some(sig), Ok(message)) => verify(&message, sig, key),
            _ => false,
        };
        if !ok {
            issues.push(if signature_present {
                "signature does not verify".to_owned()
            } else {
                "signature missing".to_owned()
            });
        }
        ok
    });

    ReceiptVerification {
        schema_valid: true,
        receipt_id_valid,
        chain_hash_valid,
        signature_present,
        signature_valid,
        issues,
    }
}

/// Link between two consecutive receipts of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkCheck {
    /// Index of the later receipt.
    pub index: usize,
    pub linked: bool,
}

/// Outcome of verifying an ordered batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchVerification {
    pub receipts: Vec<ReceiptVerification>,
    pub links: Vec<LinkCheck>,
    pub chain_continuous: bool,
}

impl BatchVerification {
    /// Every receipt valid and every link intact.
    pub fn is_valid(&self) -> bool {
        self.chain_continuous && self.receipts.iter().all(ReceiptVerification::is_valid)
    }
}

/// Verify an ordered batch of decoded receipts.
pub fn verify_receipts(batch: &[Receipt], options: &VerifyOptions) -> BatchVerification {
    let values: Vec<Value> = batch
        .iter()
        .map(|r| r.to_value().unwrap_or(Value::Null))
        .collect();
    verify_receipts_json(&values, options)
}

/// Verify an ordered batch of raw receipt documents.
///
/// `options.expected_previous_hash` applies to the first receipt only.
/// Each later receipt must carry the prior receipt's linkage id as
/// `chain.previous_hash` and the next `chain_length`. Bad records do not
/// stop the audit.
pub fn verify_receipts_json(values: &[Value], options: &VerifyOptions) -> BatchVerification {
    let rest_options = VerifyOptions {
        public_key: options.public_key,
        expected_previous_hash: None,
    };

    let receipts = values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            let opts = if i == 0 { options } else { &rest_options };
            verify_receipt_json(value, opts)
        })
        .collect();

    let decoded: Vec<Option<Receipt>> = values.iter().map(|v| check_receipt_json(v).ok()).collect();
    let links: Vec<LinkCheck> = decoded
        .windows(2)
        .enumerate()
        .map(|(i, pair)| LinkCheck {
            index: i + 1,
            linked: match (&pair[0], &pair[1]) {
                (Some(prior), Some(next)) => is_linked(prior, next),
                _ => false,
            },
        })
        .collect();

    for link in links.iter().filter(|l| !l.linked) {
        tracing::warn!(index = link.index, "receipt does not link to its predecessor");
    }

    BatchVerification {
        chain_continuous: links.iter().all(|l| l.linked),
        receipts,
        links,
    }
}

fn is_linked(prior: &Receipt, next: &Receipt) -> bool {
    let Ok(expected) = prior.linkage_id() else {
        return false;
    };
    next.chain.previous_hash == expected
        && prior.chain.chain_length.checked_add(1) == Some(next.chain.chain_length)
        && next.session_id == prior.session_id
}
