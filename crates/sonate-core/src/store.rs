//! Link storage: the abstract interface behind a [`HashChain`](crate::HashChain).
//!
//! The chain logic is storage-agnostic. This module provides the trait and
//! an in-memory implementation; `sonate-store` provides SQLite.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::chain::ChainLink;
use crate::crypto::Sha256Hash;
use crate::error::ChainIntegrityError;

/// Result of inserting a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    /// Link was inserted.
    Inserted,
    /// A link with the same hash is already stored (idempotent, not an error).
    AlreadyExists,
}

/// Append-only storage for chain links.
///
/// # Design Notes
///
/// - **Indexed twice**: by hash for lookups, by insertion order for export.
/// - **Idempotent inserts**: inserting a link whose hash is already stored
///   leaves the first copy in place and returns `AlreadyExists`.
/// - **Atomic batches**: `insert_links` stores all links or none.
/// - **Verbatim**: stores never recompute hashes. Loading tampered data is
///   allowed so that it can be audited.
pub trait LinkStore: Send + Sync {
    /// Insert a single link.
    fn insert_link(&self, link: &ChainLink) -> Result<InsertResult, ChainIntegrityError>;

    /// Insert several links under one write lock or transaction.
    fn insert_links(&self, links: &[ChainLink]) -> Result<Vec<InsertResult>, ChainIntegrityError>;

    /// Look up a link by its hash.
    fn get_link(&self, hash: &Sha256Hash) -> Result<Option<ChainLink>, ChainIntegrityError>;

    /// Check whether a link is stored.
    fn contains_link(&self, hash: &Sha256Hash) -> Result<bool, ChainIntegrityError> {
        Ok(self.get_link(hash)?.is_some())
    }

    /// All links in insertion order.
    fn links(&self) -> Result<Vec<ChainLink>, ChainIntegrityError>;

    /// Number of stored links.
    fn link_count(&self) -> Result<usize, ChainIntegrityError>;
}

/// In-memory link store.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryLinkStore {
    inner: RwLock<MemoryLinkStoreInner>,
}

#[derive(Default)]
struct MemoryLinkStoreInner {
    /// Links indexed by hash.
    by_hash: HashMap<Sha256Hash, ChainLink>,

    /// Insertion order.
    order: Vec<Sha256Hash>,
}

impl MemoryLinkStoreInner {
    fn insert(&mut self, link: &ChainLink) -> InsertResult {
        if self.by_hash.contains_key(&link.hash) {
            return InsertResult::AlreadyExists;
        }
        self.by_hash.insert(link.hash, link.clone());
        self.order.push(link.hash);
        InsertResult::Inserted
    }
}

impl MemoryLinkStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LinkStore for MemoryLinkStore {
    fn insert_link(&self, link: &ChainLink) -> Result<InsertResult, ChainIntegrityError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.insert(link))
    }

    fn insert_links(&self, links: &[ChainLink]) -> Result<Vec<InsertResult>, ChainIntegrityError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        Ok(links.iter().map(|link| inner.insert(link)).collect())
    }

    fn get_link(&self, hash: &Sha256Hash) -> Result<Option<ChainLink>, ChainIntegrityError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.by_hash.get(hash).cloned())
    }

    fn contains_link(&self, hash: &Sha256Hash) -> Result<bool, ChainIntegrityError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.by_hash.contains_key(hash))
    }

    fn links(&self) -> Result<Vec<ChainLink>, ChainIntegrityError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner
            .order
            .iter()
            .filter_map(|hash| inner.by_hash.get(hash).cloned())
            .collect())
    }

    fn link_count(&self) -> Result<usize, ChainIntegrityError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.order.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{genesis_hash, LinkSpec};

    fn link(payload: &'static str) -> ChainLink {
        LinkSpec::after(&genesis_hash("store-test"), payload)
            .timestamp(1_000)
            .build()
            .unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let store = MemoryLinkStore::new();
        let a = link("a");

        assert_eq!(store.insert_link(&a).unwrap(), InsertResult::Inserted);
        assert_eq!(store.get_link(&a.hash).unwrap(), Some(a.clone()));
        assert!(store.contains_link(&a.hash).unwrap());
        assert!(!store.contains_link(&genesis_hash("nope")).unwrap());
    }

    #[test]
    fn test_duplicate_insert_is_idempotent() {
        let store = MemoryLinkStore::new();
        let a = link("a");

        store.insert_link(&a).unwrap();
        assert_eq!(store.insert_link(&a).unwrap(), InsertResult::AlreadyExists);
        assert_eq!(store.link_count().unwrap(), 1);
    }

    #[test]
    fn test_links_keep_insertion_order() {
        let store = MemoryLinkStore::new();
        let (a, b, c) = (link("c"), link("a"), link("b"));
        store
            .insert_links(&[a.clone(), b.clone(), c.clone()])
            .unwrap();

        let hashes: Vec<_> = store.links().unwrap().into_iter().map(|l| l.hash).collect();
        assert_eq!(hashes, vec![a.hash, b.hash, c.hash]);
    }
}
