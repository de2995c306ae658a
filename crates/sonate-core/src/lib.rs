//! # SONATE Core
//!
//! Pure primitives for the SONATE audit chain: canonicalization, hash
//! chains, signatures and Merkle ledgers.
//!
//! This crate contains no networking and no persistent storage. It is pure
//! computation over cryptographic data structures, plus an in-memory
//! [`LinkStore`] so that a [`HashChain`] works out of the box.
//!
//! ## Key Types
//!
//! - [`CanonicalValue`] - A structured value with one canonical byte encoding
//! - [`Sha256Hash`] - A 32-byte digest, serialized as hex
//! - [`ChainLink`] / [`HashChain`] - Append-only, tamper-evident link sequences
//! - [`Keypair`] / [`Signature`] - Ed25519 signing in wire form
//! - [`MerkleTree`] / [`MerkleProof`] - Batch aggregation with inclusion proofs
//!
//! ## Canonicalization
//!
//! Every hash and signature is computed over canonical JSON bytes. See the
//! [`canonical`] module.

pub mod anchor;
pub mod canonical;
pub mod chain;
pub mod crypto;
pub mod error;
pub mod merkle;
pub mod store;
pub mod transcript;
pub mod types;

pub use anchor::{AnchorError, AnchorStatus, PendingProof, TimestampAnchor};
pub use canonical::{
    canonical_hash, canonical_json, canonicalize, to_canonical_value, CanonicalValue, MAX_DEPTH,
};
pub use chain::{genesis_hash, verify_link, ChainLink, ChainVerification, HashChain, LinkSpec};
pub use crypto::{sign, verify, Keypair, PublicKey, Sha256Hash, Signature, ED25519};
pub use error::{
    CanonicalizationError, ChainIntegrityError, CoreError, MerkleError, Result, SignatureError,
};
pub use merkle::{verify_proof, MerkleProof, MerkleTree, ProofStep, Side};
pub use store::{InsertResult, LinkStore, MemoryLinkStore};
pub use transcript::{canonical_transcript, normalize_text, transcript_hash, Transcript, Turn};
pub use types::{now_millis, UnixMillis};
