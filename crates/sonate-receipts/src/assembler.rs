//! Receipt assembly: canonicalize, chain, sign.

use chrono::{DateTime, SecondsFormat, Utc};

use sonate_core::{Keypair, PublicKey, SignatureError, Signature};

use crate::error::Result;
use crate::receipt::{
    chain_seed, compute_chain_hash, content_for_id, signing_bytes, ChainMeta, InteractionPayload,
    Receipt, RECEIPT_VERSION, UNSIGNED_ID,
};

/// Configuration for the assembler.
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// Receipt format version.
    pub version: String,
    /// Governance mode recorded on every receipt.
    pub mode: String,
    /// Policy version recorded on every receipt.
    pub policy_version: String,
    /// Label attached to signatures so verifiers can pick the right key.
    pub key_version: Option<String>,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            version: RECEIPT_VERSION.to_owned(),
            mode: "constitutional".to_owned(),
            policy_version: "1.0.0".to_owned(),
            key_version: None,
        }
    }
}

/// Something that can sign receipt bytes.
///
/// Implemented for [`Keypair`]. Remote signers (an HSM, a KMS) implement it
/// and return `Err` when the key is unreachable; the assembler then falls
/// back to an unsigned receipt.
pub trait ReceiptSigner {
    /// Sign canonical receipt bytes.
    fn sign_receipt(&self, message: &[u8]) -> std::result::Result<Signature, SignatureError>;

    /// The key verifiers should use.
    fn public_key(&self) -> PublicKey;
}

impl ReceiptSigner for Keypair {
    fn sign_receipt(&self, message: &[u8]) -> std::result::Result<Signature, SignatureError> {
        Ok(self.sign(message))
    }

    fn public_key(&self) -> PublicKey {
        Keypair::public_key(self)
    }
}

/// The caller-supplied part of a receipt.
#[derive(Debug, Clone)]
pub struct ReceiptDraft {
    pub session_id: String,
    pub agent_did: String,
    pub human_did: String,
    pub interaction: InteractionPayload,
    /// Defaults to now.
    pub timestamp: Option<DateTime<Utc>>,
}

impl ReceiptDraft {
    /// Start a draft.
    pub fn new(session_id: impl Into<String>, interaction: InteractionPayload) -> Self {
        Self {
            session_id: session_id.into(),
            agent_did: String::new(),
            human_did: String::new(),
            interaction,
            timestamp: None,
        }
    }

    /// Set the agent DID.
    pub fn agent(mut self, did: impl Into<String>) -> Self {
        self.agent_did = did.into();
        self
    }

    /// Set the human DID.
    pub fn human(mut self, did: impl Into<String>) -> Self {
        self.human_did = did.into();
        self
    }

    /// Fix the timestamp.
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// A freshly assembled receipt.
///
/// Signed and unsigned receipts are distinct variants so callers cannot
/// mistake one for the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuiltReceipt {
    Signed(Receipt),
    Unsigned(Receipt),
}

impl BuiltReceipt {
    /// The receipt, whichever variant.
    pub fn receipt(&self) -> &Receipt {
        match self {
            Self::Signed(r) | Self::Unsigned(r) => r,
        }
    }

    /// Take the receipt, whichever variant.
    pub fn into_receipt(self) -> Receipt {
        match self {
            Self::Signed(r) | Self::Unsigned(r) => r,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Self::Signed(_))
    }
}

/// Builds receipts with a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct Assembler {
    config: AssemblerConfig,
}

impl Assembler {
    pub fn new(config: AssemblerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// Assemble a receipt.
    ///
    /// Computes the content id and chain hash, then signs the canonical
    /// receipt. Without a signer, or if the signer fails, the receipt is
    /// returned unsigned with `id = "unsigned"`.
    pub fn build_receipt(
        &self,
        draft: ReceiptDraft,
        chain: ChainMeta,
        signer: Option<&dyn ReceiptSigner>,
    ) -> Result<BuiltReceipt> {
        let timestamp = draft
            .timestamp
            .unwrap_or_else(Utc::now)
            .to_rfc3339_opts(SecondsFormat::Millis, true);

        let mut receipt = Receipt {
            id: String::new(),
            version: self.config.version.clone(),
            timestamp,
            mode: self.config.mode.clone(),
            session_id: draft.session_id,
            agent_did: draft.agent_did,
            human_did: draft.human_did,
            policy_version: self.config.policy_version.clone(),
            interaction: draft.interaction,
            chain: ChainMeta {
                chain_hash: String::new(),
                ..chain
            },
            signature: None,
        };

        let content = content_for_id(&receipt.to_value()?)?;
        let seed = chain_seed(&receipt.chain.previous_hash, &receipt.session_id);
        receipt.chain.chain_hash = compute_chain_hash(&content, &seed).to_hex();

        let Some(signer) = signer else {
            receipt.id = UNSIGNED_ID.to_owned();
            return Ok(BuiltReceipt::Unsigned(receipt));
        };

        receipt.id = sonate_core::Sha256Hash::hash(&content).to_hex();
        let message = signing_bytes(&receipt.to_value()?)?;

        match signer.sign_receipt(&message) {
            Ok(signature) => {
                let signature = match &self.config.key_version {
                    Some(version) => signature.with_key_version(version.clone()),
                    None => signature,
                };
                receipt.signature = Some(signature);
                Ok(BuiltReceipt::Signed(receipt))
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    session_id = %receipt.session_id,
                    "signer unavailable, emitting unsigned receipt"
                );
                receipt.id = UNSIGNED_ID.to_owned();
                Ok(BuiltReceipt::Unsigned(receipt))
            }
        }
    }
}

/// Assemble a receipt with the default configuration.
pub fn build_receipt(
    draft: ReceiptDraft,
    chain: ChainMeta,
    signer: Option<&dyn ReceiptSigner>,
) -> Result<BuiltReceipt> {
    Assembler::default().build_receipt(draft, chain, signer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sonate_core::{genesis_hash, verify, Sha256Hash};

    struct FailingSigner;

    impl ReceiptSigner for FailingSigner {
        fn sign_receipt(&self, _: &[u8]) -> std::result::Result<Signature, SignatureError> {
            Err(SignatureError::KeyUnavailable)
        }

        fn public_key(&self) -> PublicKey {
            PublicKey::from_bytes([0u8; 32])
        }
    }

    fn draft() -> ReceiptDraft {
        ReceiptDraft::new("session-1", InteractionPayload::exchange("hi", "hello", "model-x"))
            .agent("did:agent:1")
            .human("did:human:1")
            .timestamp(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap())
    }

    #[test]
    fn test_signed_receipt_fields() {
        let keypair = Keypair::from_seed(&[7u8; 32]);
        let built = build_receipt(draft(), ChainMeta::genesis(), Some(&keypair)).unwrap();
        assert!(built.is_signed());

        let r = built.receipt();
        assert_eq!(r.version, "2.0.0");
        assert_eq!(r.mode, "constitutional");
        assert_eq!(r.timestamp, "2024-01-02T03:04:05.000Z");
        assert_eq!(r.id.len(), 64);
        assert_eq!(r.chain.chain_hash.len(), 64);
        assert_eq!(r.chain.previous_hash, "GENESIS");

        let sig = r.signature.as_ref().unwrap();
        let message = signing_bytes(&r.to_value().unwrap()).unwrap();
        assert!(verify(&message, sig, &keypair.public_key()));
    }

    #[test]
    fn test_id_and_chain_hash_derivation() {
        let keypair = Keypair::from_seed(&[7u8; 32]);
        let r = build_receipt(draft(), ChainMeta::genesis(), Some(&keypair))
            .unwrap()
            .into_receipt();

        let content = content_for_id(&r.to_value().unwrap()).unwrap();
        assert_eq!(r.id, Sha256Hash::hash(&content).to_hex());

        let seed = genesis_hash("session-1").to_hex();
        assert_eq!(r.chain.chain_hash, compute_chain_hash(&content, &seed).to_hex());
    }

    #[test]
    fn test_no_signer_yields_unsigned() {
        let built = build_receipt(draft(), ChainMeta::genesis(), None).unwrap();
        let BuiltReceipt::Unsigned(r) = built else {
            panic!("expected unsigned receipt");
        };
        assert_eq!(r.id, "unsigned");
        assert!(r.signature.is_none());
        assert!(!r.to_value().unwrap().as_object().unwrap().contains_key("signature"));
    }

    #[test]
    fn test_failing_signer_falls_back_to_unsigned() {
        let built = build_receipt(draft(), ChainMeta::genesis(), Some(&FailingSigner)).unwrap();
        assert!(!built.is_signed());
        assert_eq!(built.receipt().id, "unsigned");
    }

    #[test]
    fn test_key_version_is_attached() {
        let assembler = Assembler::new(AssemblerConfig {
            key_version: Some("k-2024".into()),
            ..AssemblerConfig::default()
        });
        let keypair = Keypair::from_seed(&[1u8; 32]);
        let r = assembler
            .build_receipt(draft(), ChainMeta::genesis(), Some(&keypair))
            .unwrap()
            .into_receipt();
        assert_eq!(r.signature.unwrap().key_version.as_deref(), Some("k-2024"));
    }

    #[test]
    fn test_chain_meta_after_links_to_prior() {
        let keypair = Keypair::from_seed(&[7u8; 32]);
        let first = build_receipt(draft(), ChainMeta::genesis(), Some(&keypair))
            .unwrap()
            .into_receipt();
        let meta = ChainMeta::after(&first).unwrap();
        assert_eq!(meta.previous_hash, first.id);
        assert_eq!(meta.chain_length, 2);

        let unsigned = build_receipt(draft(), ChainMeta::genesis(), None)
            .unwrap()
            .into_receipt();
        let meta = ChainMeta::after(&unsigned).unwrap();
        assert_eq!(meta.previous_hash, unsigned.content_id().unwrap().to_hex());
    }

    #[test]
    fn test_same_inputs_same_receipt() {
        let keypair = Keypair::from_seed(&[7u8; 32]);
        let a = build_receipt(draft(), ChainMeta::genesis(), Some(&keypair)).unwrap();
        let b = build_receipt(draft(), ChainMeta::genesis(), Some(&keypair)).unwrap();
        assert_eq!(a, b);
    }
}
