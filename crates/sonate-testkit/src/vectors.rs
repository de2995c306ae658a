//! Golden test vectors for deterministic verification.
//!
//! Expected values were computed independently of this workspace (plain
//! SHA-256 and RFC 8032 Ed25519 over the documented byte layouts), so a
//! mismatch means an encoding changed.

use chrono::{TimeZone, Utc};

use sonate_core::{genesis_hash, Keypair, MerkleTree, Sha256Hash};
use sonate_receipts::{build_receipt, ChainMeta, InteractionPayload, Receipt, ReceiptDraft};

/// `genesis_hash("demo-chain")`.
pub const DEMO_CHAIN_GENESIS: &str =
    "a59ac13d1c00a0205a391f290fa4ed1d8ffff799fb0709339fcc3387aa8ef15a";

/// Root of the tree over [`merkle_leaves`]. The fifth leaf is paired with
/// itself at the first level.
pub const MERKLE_FIVE_LEAF_ROOT: &str =
    "3ad4abec5d43ae09f5275cf7ce77d8615e1e87164b255aa7661e237b1982a5bf";

/// Leaves `SHA256("leaf-0")` through `SHA256("leaf-4")`.
pub fn merkle_leaves() -> Vec<Sha256Hash> {
    (0..5)
        .map(|i| Sha256Hash::hash(format!("leaf-{i}").as_bytes()))
        .collect()
}

/// A golden signed receipt.
#[derive(Debug, Clone)]
pub struct ReceiptVector {
    pub name: &'static str,
    /// Seed for deterministic key generation.
    pub seed: [u8; 32],
    pub session_id: &'static str,
    pub agent_did: &'static str,
    pub human_did: &'static str,
    pub prompt: &'static str,
    pub response: &'static str,
    pub model: &'static str,
    /// 2024-01-02T03:04:05.000Z as (year, month, day, hour, min, sec).
    pub timestamp: (i32, u32, u32, u32, u32, u32),
    pub expected_public_key: &'static str,
    /// Canonical receipt content the id is computed over.
    pub expected_content: &'static str,
    pub expected_id: &'static str,
    pub expected_chain_hash: &'static str,
    pub expected_signature: &'static str,
}

/// Get all golden receipt vectors.
pub fn receipt_vectors() -> Vec<ReceiptVector> {
    vec![ReceiptVector {
        name: "genesis exchange receipt",
        seed: [7u8; 32],
        session_id: "session-1",
        agent_did: "did:agent:1",
        human_did: "did:human:1",
        prompt: "hi",
        response: "hello",
        model: "model-x",
        timestamp: (2024, 1, 2, 3, 4, 5),
        expected_public_key: "ea4a6c63e29c520abef5507b132ec5f9954776aebebe7b92421eea691446d22c",
        expected_content: concat!(
            r#"{"agent_did":"did:agent:1","chain":{"chain_length":1,"previous_hash":"GENESIS"},"#,
            r#""human_did":"did:human:1","interaction":{"model":"model-x","prompt":"hi","response":"hello"},"#,
            r#""mode":"constitutional","policy_version":"1.0.0","session_id":"session-1","#,
            r#""timestamp":"2024-01-02T03:04:05.000Z","version":"2.0.0"}"#,
        ),
        expected_id: "af965aaed333b9839b9479e1a3274072ac58a62bf2b26119cd9eee59277572f1",
        expected_chain_hash: "43f9be78eefda7aa8506821b8ec5c2573f9fdd877b79129d37d74e04325a5676",
        expected_signature: concat!(
            "a5a6c21ca482ea4d099fd86e0cfc94282bc2b1eaeeea4974b79e9db08ba82586",
            "bf3f51812c2647cf1fe12223d91d0f3c68057dcfaf419836538fc1fe7b5f6606",
        ),
    }]
}

/// Build the receipt a vector describes.
pub fn receipt_from_vector(vector: &ReceiptVector) -> Receipt {
    let (y, mo, d, h, mi, s) = vector.timestamp;
    let keypair = Keypair::from_seed(&vector.seed);
    let draft = ReceiptDraft::new(
        vector.session_id,
        InteractionPayload::exchange(vector.prompt, vector.response, vector.model),
    )
    .agent(vector.agent_did)
    .human(vector.human_did)
    .timestamp(Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap());

    build_receipt(draft, ChainMeta::genesis(), Some(&keypair))
        .expect("golden vector receipt builds")
        .into_receipt()
}

/// Check every vector. Returns `(name, matches, detail)` per check.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    let mut results = Vec::new();

    let genesis = genesis_hash("demo-chain").to_hex();
    results.push((
        "demo-chain genesis".to_string(),
        genesis == DEMO_CHAIN_GENESIS,
        genesis,
    ));

    let root = MerkleTree::build(merkle_leaves())
        .map(|t| t.root().to_hex())
        .unwrap_or_default();
    results.push((
        "five-leaf merkle root".to_string(),
        root == MERKLE_FIVE_LEAF_ROOT,
        root,
    ));

    for vector in receipt_vectors() {
        let receipt = receipt_from_vector(&vector);
        let signature = receipt
            .signature
            .as_ref()
            .map(|s| s.value.clone())
            .unwrap_or_default();
        let matches = receipt.id == vector.expected_id
            && receipt.chain.chain_hash == vector.expected_chain_hash
            && signature == vector.expected_signature;
        results.push((vector.name.to_string(), matches, receipt.id));
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_vectors_match() {
        for (name, matches, detail) in verify_all_vectors() {
            assert!(matches, "vector '{name}' produced {detail}");
        }
    }

    #[test]
    fn test_vectors_are_deterministic() {
        for vector in receipt_vectors() {
            assert_eq!(receipt_from_vector(&vector), receipt_from_vector(&vector));
        }
    }
}
