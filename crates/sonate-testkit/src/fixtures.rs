//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use chrono::{DateTime, Duration, TimeZone, Utc};

use sonate_core::{
    genesis_hash, ChainLink, HashChain, Keypair, LinkSpec, LinkStore, PublicKey, Sha256Hash,
};
use sonate_receipts::{
    Assembler, AssemblerConfig, ChainMeta, InteractionPayload, Receipt, ReceiptDraft,
};

/// A test fixture with a keypair and a fixed session.
pub struct TestFixture {
    pub keypair: Keypair,
    pub session_id: String,
    pub assembler: Assembler,
    /// Timestamp of the first receipt; later receipts add one second each.
    pub epoch: DateTime<Utc>,
}

impl TestFixture {
    /// Create a new test fixture with a random keypair.
    pub fn new() -> Self {
        Self::from_keypair(Keypair::generate())
    }

    /// Create with a deterministic keypair from seed.
    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self::from_keypair(Keypair::from_seed(&seed))
    }

    fn from_keypair(keypair: Keypair) -> Self {
        Self {
            keypair,
            session_id: "test-session".to_string(),
            assembler: Assembler::new(AssemblerConfig::default()),
            epoch: Utc
                .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
                .single()
                .expect("fixed epoch is valid"),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    fn draft(&self, n: u64, prompt: &str, response: &str) -> ReceiptDraft {
        ReceiptDraft::new(
            self.session_id.clone(),
            InteractionPayload::exchange(prompt, response, "test-model"),
        )
        .agent("did:agent:test")
        .human("did:human:test")
        .timestamp(self.epoch + Duration::seconds(n as i64))
    }

    /// Build a signed receipt at `chain`.
    pub fn make_receipt(&self, chain: ChainMeta, prompt: &str, response: &str) -> Receipt {
        let n = chain.chain_length;
        self.assembler
            .build_receipt(self.draft(n, prompt, response), chain, Some(&self.keypair))
            .expect("fixture receipt builds")
            .into_receipt()
    }

    /// Build an unsigned receipt at `chain`.
    pub fn make_unsigned(&self, chain: ChainMeta, prompt: &str, response: &str) -> Receipt {
        let n = chain.chain_length;
        self.assembler
            .build_receipt(self.draft(n, prompt, response), chain, None)
            .expect("fixture receipt builds")
            .into_receipt()
    }

    /// A continuous chain of `len` signed receipts.
    pub fn receipt_chain(&self, len: usize) -> Vec<Receipt> {
        let mut receipts: Vec<Receipt> = Vec::with_capacity(len);
        for i in 0..len {
            let chain = match receipts.last() {
                Some(prior) => ChainMeta::after(prior).expect("fixture receipt links"),
                None => ChainMeta::genesis(),
            };
            receipts.push(self.make_receipt(chain, &format!("prompt {i}"), &format!("response {i}")));
        }
        receipts
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Create multiple test fixtures for multi-party tests.
pub fn multi_party_fixtures(count: usize) -> Vec<TestFixture> {
    (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[0] = i as u8;
            TestFixture::with_seed(seed)
        })
        .collect()
}

/// Append `len` links after `genesis_hash(identifier)`.
///
/// Timestamps are fixed so the resulting hashes are reproducible.
pub fn link_chain<S: LinkStore>(
    chain: &HashChain<S>,
    identifier: &str,
    len: usize,
) -> (Sha256Hash, Vec<ChainLink>) {
    let genesis = genesis_hash(identifier);
    let mut prev = genesis;
    let mut links = Vec::with_capacity(len);
    for i in 0..len {
        let link = chain
            .create_link(
                LinkSpec::after(&prev, format!("payload-{i}")).timestamp(1_700_000_000_000 + i as i64),
            )
            .expect("fixture link appends");
        prev = link.hash;
        links.push(link);
    }
    (genesis, links)
}
