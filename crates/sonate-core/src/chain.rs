//! Hash chains: append-only sequences of tamper-evident links.
//!
//! Each link's hash commits to its content and to the previous link's hash,
//! so altering any stored link breaks every hash that follows it.

use std::collections::{BTreeMap, HashSet};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::canonical::{canonicalize, CanonicalValue};
use crate::crypto::Sha256Hash;
use crate::error::{CanonicalizationError, ChainIntegrityError};
use crate::store::{LinkStore, MemoryLinkStore};
use crate::types::{hex_bytes, now_millis, UnixMillis};

/// The deterministic starting hash for a chain: `SHA256(identifier)`.
pub fn genesis_hash(identifier: &str) -> Sha256Hash {
    Sha256Hash::hash(identifier.as_bytes())
}

/// A single link in a hash chain.
///
/// The hash is computed over, in this exact order:
///
/// ```text
/// previous_hash (lowercase hex) || payload || timestamp (decimal)
///     || signature || canonical(metadata)
/// ```
///
/// An absent signature or metadata contributes zero bytes. Links are built
/// once through [`LinkSpec`] and never mutated by the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainLink {
    pub hash: Sha256Hash,
    pub previous_hash: Sha256Hash,
    #[serde(with = "hex_bytes")]
    pub payload: Bytes,
    pub timestamp: UnixMillis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, CanonicalValue>>,
}

impl ChainLink {
    /// Compute the hash a link with these fields must carry.
    pub fn compute_hash(
        previous_hash: &Sha256Hash,
        payload: &[u8],
        timestamp: UnixMillis,
        signature: Option<&str>,
        metadata: Option<&BTreeMap<String, CanonicalValue>>,
    ) -> Result<Sha256Hash, CanonicalizationError> {
        let metadata_bytes = match metadata {
            Some(map) => canonicalize(&CanonicalValue::Object(map.clone()))?,
            None => Vec::new(),
        };
        let previous_hex = previous_hash.to_hex();
        let timestamp_dec = timestamp.to_string();

        Ok(Sha256Hash::hash_parts([
            previous_hex.as_bytes(),
            payload,
            timestamp_dec.as_bytes(),
            signature.unwrap_or("").as_bytes(),
            metadata_bytes.as_slice(),
        ]))
    }

    /// Recompute this link's hash from its stored fields.
    pub fn recompute_hash(&self) -> Result<Sha256Hash, CanonicalizationError> {
        Self::compute_hash(
            &self.previous_hash,
            &self.payload,
            self.timestamp,
            self.signature.as_deref(),
            self.metadata.as_ref(),
        )
    }
}

/// Verify a single link by recomputing its hash. Pure.
pub fn verify_link(link: &ChainLink) -> bool {
    matches!(link.recompute_hash(), Ok(hash) if hash == link.hash)
}

/// Builder for a new link.
///
/// `previous_hash` is kept as text until the link is built so that a batch
/// can reject a malformed reference before anything is stored.
#[derive(Debug, Clone)]
pub struct LinkSpec {
    previous_hash: String,
    payload: Bytes,
    timestamp: Option<UnixMillis>,
    signature: Option<String>,
    metadata: Option<BTreeMap<String, CanonicalValue>>,
}

impl LinkSpec {
    /// Start a link that references `previous_hash` (hex).
    pub fn new(previous_hash: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            previous_hash: previous_hash.into(),
            payload: payload.into(),
            timestamp: None,
            signature: None,
            metadata: None,
        }
    }

    /// Start a link that follows an existing hash.
    pub fn after(previous: &Sha256Hash, payload: impl Into<Bytes>) -> Self {
        Self::new(previous.to_hex(), payload)
    }

    /// Fix the timestamp (defaults to now).
    pub fn timestamp(mut self, timestamp: UnixMillis) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Attach a signature string.
    pub fn signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// Attach metadata.
    pub fn metadata(mut self, metadata: BTreeMap<String, CanonicalValue>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Validate the spec and compute the link. Nothing is stored.
    pub fn build(self) -> Result<ChainLink, ChainIntegrityError> {
        let previous_hash = Sha256Hash::from_hex(&self.previous_hash)
            .map_err(|_| ChainIntegrityError::MalformedHash(self.previous_hash.clone()))?;
        let timestamp = self.timestamp.unwrap_or_else(now_millis);
        let hash = ChainLink::compute_hash(
            &previous_hash,
            &self.payload,
            timestamp,
            self.signature.as_deref(),
            self.metadata.as_ref(),
        )?;

        Ok(ChainLink {
            hash,
            previous_hash,
            payload: self.payload,
            timestamp,
            signature: self.signature,
            metadata: self.metadata,
        })
    }
}

/// Result of walking a chain backward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    /// True when the walk reached the genesis hash without a failure.
    pub valid: bool,
    /// Hash of the first link that failed, if any.
    pub broken_at: Option<Sha256Hash>,
    /// Human-readable descriptions of what failed.
    pub issues: Vec<String>,
    /// Number of links in the store.
    pub total_links: usize,
    /// Links verified before the walk stopped.
    pub verified_links: usize,
}

/// An append-only hash chain over a [`LinkStore`].
pub struct HashChain<S: LinkStore = MemoryLinkStore> {
    store: S,
}

impl HashChain<MemoryLinkStore> {
    /// Create an empty in-memory chain.
    pub fn new() -> Self {
        Self::with_store(MemoryLinkStore::new())
    }

    /// Load previously exported links verbatim, keeping their order.
    ///
    /// Hashes are not recomputed, so tampered links load and show up as
    /// failures in [`verify_chain`](Self::verify_chain).
    pub fn from_links(
        links: impl IntoIterator<Item = ChainLink>,
    ) -> Result<Self, ChainIntegrityError> {
        let chain = Self::new();
        let links: Vec<ChainLink> = links.into_iter().collect();
        chain.store.insert_links(&links)?;
        Ok(chain)
    }
}

impl Default for HashChain<MemoryLinkStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: LinkStore> HashChain<S> {
    /// Create a chain over an existing store.
    pub fn with_store(store: S) -> Self {
        Self { store }
    }

    /// Access the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Build a link from `spec` and append it.
    pub fn create_link(&self, spec: LinkSpec) -> Result<ChainLink, ChainIntegrityError> {
        let link = spec.build()?;
        self.store.insert_link(&link)?;
        Ok(link)
    }

    /// Build and append several links.
    ///
    /// Each spec's `previous_hash` is honored as given. Every spec is
    /// validated before any link is stored: one bad spec rejects the batch.
    pub fn create_batch(&self, specs: Vec<LinkSpec>) -> Result<Vec<ChainLink>, ChainIntegrityError> {
        let count = specs.len();
        let links = specs
            .into_iter()
            .map(LinkSpec::build)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                tracing::warn!(error = %e, count, "rejecting link batch");
                e
            })?;
        self.store.insert_links(&links)?;
        Ok(links)
    }

    /// Recompute a link's hash. Pure.
    pub fn verify_link(&self, link: &ChainLink) -> bool {
        verify_link(link)
    }

    /// Walk backward from `current` until `genesis`.
    ///
    /// At each step the link's hash is recomputed and its predecessor must
    /// be stored. The walk stops at the first failure and reports the hash
    /// of the failing link. An unknown predecessor is a break, never an
    /// implicit genesis.
    pub fn verify_chain(
        &self,
        current: &Sha256Hash,
        genesis: &Sha256Hash,
    ) -> Result<ChainVerification, ChainIntegrityError> {
        let total_links = self.store.link_count()?;
        let mut verified_links = 0;
        let mut seen = HashSet::new();
        let mut cursor = *current;

        let failure = loop {
            if cursor == *genesis {
                break None;
            }
            if !seen.insert(cursor) {
                break Some((cursor, format!("link {cursor} is reachable from itself")));
            }
            let Some(link) = self.store.get_link(&cursor)? else {
                break Some((cursor, format!("link {cursor} not found")));
            };
            if !verify_link(&link) {
                break Some((link.hash, format!("link {} hash mismatch", link.hash)));
            }
            if link.previous_hash != *genesis && !self.store.contains_link(&link.previous_hash)? {
                break Some((
                    link.hash,
                    format!(
                        "link {} references unknown predecessor {}",
                        link.hash, link.previous_hash
                    ),
                ));
            }
            verified_links += 1;
            cursor = link.previous_hash;
        };

        let (valid, broken_at, issues) = match failure {
            None => (true, None, Vec::new()),
            Some((hash, issue)) => {
                tracing::warn!(broken_at = %hash, verified_links, "chain verification failed");
                (false, Some(hash), vec![issue])
            }
        };

        Ok(ChainVerification {
            valid,
            broken_at,
            issues,
            total_links,
            verified_links,
        })
    }

    /// Look up a link by hash.
    pub fn get_link(&self, hash: &Sha256Hash) -> Result<Option<ChainLink>, ChainIntegrityError> {
        self.store.get_link(hash)
    }

    /// All links in insertion order.
    pub fn links(&self) -> Result<Vec<ChainLink>, ChainIntegrityError> {
        self.store.links()
    }

    /// Number of stored links.
    pub fn len(&self) -> Result<usize, ChainIntegrityError> {
        self.store.link_count()
    }

    /// Whether the chain holds no links.
    pub fn is_empty(&self) -> Result<bool, ChainIntegrityError> {
        Ok(self.len()? == 0)
    }

    /// Hash of the most recently appended link.
    pub fn head(&self) -> Result<Option<Sha256Hash>, ChainIntegrityError> {
        Ok(self.store.links()?.last().map(|l| l.hash))
    }
}
