//! Trust receipt wire format.
//!
//! A receipt records one AI interaction. Its `id` is the SHA-256 of the
//! canonical receipt with `id`, `signature` and `chain.chain_hash` removed
//! (the "content for id"). Its `chain.chain_hash` is
//! `SHA256(content_for_id || seed)`, where the seed is `chain.previous_hash`,
//! or for the first receipt of a session (`"GENESIS"`) the hex genesis hash
//! of the session id. The signature covers the canonical receipt with only
//! `signature` removed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use sonate_core::{
    canonical_hash, canonicalize, genesis_hash, CanonicalValue, CanonicalizationError,
    Sha256Hash, Signature,
};

use crate::error::{Result, SchemaError};

/// Receipt format version emitted by this crate.
pub const RECEIPT_VERSION: &str = "2.0.0";

/// `chain.previous_hash` of the first receipt in a session.
pub const GENESIS: &str = "GENESIS";

/// `id` of a receipt produced without a signing key.
pub const UNSIGNED_ID: &str = "unsigned";

/// A trust receipt, field-exact with the JSON wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: String,
    pub version: String,
    /// ISO-8601 timestamp.
    pub timestamp: String,
    pub mode: String,
    pub session_id: String,
    pub agent_did: String,
    pub human_did: String,
    pub policy_version: String,
    pub interaction: InteractionPayload,
    pub chain: ChainMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
}

impl Receipt {
    /// Whether the receipt carries a signature.
    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// Whether the receipt was produced without a signing key.
    pub fn is_unsigned(&self) -> bool {
        self.id == UNSIGNED_ID
    }

    /// The receipt as a JSON value.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Recompute the content id from the receipt's fields.
    pub fn content_id(&self) -> Result<Sha256Hash> {
        Ok(Sha256Hash::hash(&content_for_id(&self.to_value()?)?))
    }

    /// The value the next receipt must carry as `chain.previous_hash`.
    ///
    /// For signed receipts this is `id`. Unsigned receipts carry the
    /// placeholder `"unsigned"`, so the recomputed content id is used.
    pub fn linkage_id(&self) -> Result<String> {
        if self.is_unsigned() {
            Ok(self.content_id()?.to_hex())
        } else {
            Ok(self.id.clone())
        }
    }
}

/// The recorded interaction.
///
/// Serialized untagged: an `Exchange` is exactly
/// `{ "prompt", "response", "model" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InteractionPayload {
    /// Full prompt and response text.
    Exchange {
        prompt: String,
        response: String,
        model: String,
    },
    /// Content withheld; only canonical hashes are recorded.
    Digest {
        prompt_hash: String,
        response_hash: String,
        model: String,
    },
    /// Opaque bytes with a declared content type.
    Opaque { content_type: String, data_hex: String },
}

impl InteractionPayload {
    /// A full exchange.
    pub fn exchange(
        prompt: impl Into<String>,
        response: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self::Exchange {
            prompt: prompt.into(),
            response: response.into(),
            model: model.into(),
        }
    }

    /// An exchange with content withheld: prompt and response are replaced
    /// by the SHA-256 of their canonical JSON form.
    pub fn digest(
        prompt: &str,
        response: &str,
        model: impl Into<String>,
    ) -> std::result::Result<Self, CanonicalizationError> {
        Ok(Self::Digest {
            prompt_hash: canonical_hash(prompt)?.to_hex(),
            response_hash: canonical_hash(response)?.to_hex(),
            model: model.into(),
        })
    }

    /// Opaque bytes.
    pub fn opaque(content_type: impl Into<String>, data: &[u8]) -> Self {
        Self::Opaque {
            content_type: content_type.into(),
            data_hex: hex::encode(data),
        }
    }

    /// The model name, if the payload names one.
    pub fn model(&self) -> Option<&str> {
        match self {
            Self::Exchange { model, .. } | Self::Digest { model, .. } => Some(model),
            Self::Opaque { .. } => None,
        }
    }
}

/// Position of a receipt in its session chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainMeta {
    /// Prior receipt's id, or `"GENESIS"`.
    pub previous_hash: String,
    /// Filled in by the assembler.
    #[serde(default)]
    pub chain_hash: String,
    pub chain_length: u64,
}

impl ChainMeta {
    /// Metadata for the first receipt of a session.
    pub fn genesis() -> Self {
        Self {
            previous_hash: GENESIS.to_owned(),
            chain_hash: String::new(),
            chain_length: 1,
        }
    }

    /// Metadata for the receipt that follows `prior`.
    ///
    /// Fails when `prior` already sits at the maximum chain length.
    pub fn after(prior: &Receipt) -> Result<Self> {
        let chain_length = prior.chain.chain_length.checked_add(1).ok_or_else(|| {
            SchemaError::InvalidField {
                path: "chain.chain_length".to_owned(),
                reason: "chain length cannot be extended".to_owned(),
            }
        })?;
        Ok(Self {
            previous_hash: prior.linkage_id()?,
            chain_hash: String::new(),
            chain_length,
        })
    }

    /// Whether this is the first receipt of a session.
    pub fn is_genesis(&self) -> bool {
        self.previous_hash == GENESIS
    }
}

/// Canonical bytes of a receipt without `id`, `signature` and
/// `chain.chain_hash`.
pub fn content_for_id(receipt: &Value) -> std::result::Result<Vec<u8>, CanonicalizationError> {
    let mut value = CanonicalValue::from(receipt.clone());
    if let Some(map) = value.as_object_mut() {
        map.remove("id");
        map.remove("signature");
        if let Some(chain) = map.get_mut("chain").and_then(CanonicalValue::as_object_mut) {
            chain.remove("chain_hash");
        }
    }
    canonicalize(&value)
}

/// Canonical bytes covered by the signature: the receipt without
/// `signature`.
pub fn signing_bytes(receipt: &Value) -> std::result::Result<Vec<u8>, CanonicalizationError> {
    let mut value = CanonicalValue::from(receipt.clone());
    if let Some(map) = value.as_object_mut() {
        map.remove("signature");
    }
    canonicalize(&value)
}

/// The seed mixed into `chain_hash`.
pub fn chain_seed(previous_hash: &str, session_id: &str) -> String {
    if previous_hash == GENESIS {
        genesis_hash(session_id).to_hex()
    } else {
        previous_hash.to_owned()
    }
}

/// `SHA256(content || seed)`.
pub fn compute_chain_hash(content: &[u8], seed: &str) -> Sha256Hash {
    Sha256Hash::hash_parts([content, seed.as_bytes()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_exchange_wire_shape() {
        let payload = InteractionPayload::exchange("p", "r", "m");
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({ "prompt": "p", "response": "r", "model": "m" })
        );
    }

    #[test]
    fn test_untagged_payload_decodes_each_variant() {
        let exchange: InteractionPayload =
            serde_json::from_value(json!({ "prompt": "p", "response": "r", "model": "m" })).unwrap();
        assert!(matches!(exchange, InteractionPayload::Exchange { .. }));

        let digest: InteractionPayload = serde_json::from_value(
            json!({ "prompt_hash": "aa", "response_hash": "bb", "model": "m" }),
        )
        .unwrap();
        assert!(matches!(digest, InteractionPayload::Digest { .. }));

        let opaque: InteractionPayload =
            serde_json::from_value(json!({ "content_type": "image/png", "data_hex": "00ff" }))
                .unwrap();
        assert_eq!(opaque, InteractionPayload::opaque("image/png", &[0x00, 0xff]));
        assert_eq!(opaque.model(), None);
    }

    #[test]
    fn test_digest_hashes_canonical_strings() {
        let payload = InteractionPayload::digest("hello", "world", "m").unwrap();
        let InteractionPayload::Digest { prompt_hash, .. } = payload else {
            panic!("expected digest");
        };
        // The canonical form of a string is its quoted JSON literal
        assert_eq!(prompt_hash, Sha256Hash::hash(b"\"hello\"").to_hex());
    }

    #[test]
    fn test_content_for_id_strips_only_identity_fields() {
        let receipt = json!({
            "id": "x",
            "signature": { "algorithm": "Ed25519", "value": "00" },
            "chain": { "previous_hash": "GENESIS", "chain_hash": "y", "chain_length": 1 },
            "mode": "constitutional"
        });
        let content = String::from_utf8(content_for_id(&receipt).unwrap()).unwrap();
        assert_eq!(
            content,
            r#"{"chain":{"chain_length":1,"previous_hash":"GENESIS"},"mode":"constitutional"}"#
        );

        let signed = String::from_utf8(signing_bytes(&receipt).unwrap()).unwrap();
        assert!(signed.contains(r#""chain_hash":"y""#));
        assert!(signed.contains(r#""id":"x""#));
        assert!(!signed.contains("signature"));
    }

    #[test]
    fn test_genesis_seed_is_session_genesis_hash() {
        assert_eq!(chain_seed(GENESIS, "s1"), genesis_hash("s1").to_hex());
        assert_eq!(chain_seed("abc", "s1"), "abc");
    }
}
