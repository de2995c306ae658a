//! # SONATE Testkit
//!
//! Testing utilities for the SONATE audit chain.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: fixed inputs with independently computed digests
//!   and signatures
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: deterministic keys, receipt chains and link chains
//! - **Anchor double**: an in-memory [`TimestampAnchor`](sonate_core::TimestampAnchor)
//!
//! ## Golden Vectors
//!
//! ```rust
//! use sonate_testkit::vectors::verify_all_vectors;
//!
//! for (name, matches, detail) in verify_all_vectors() {
//!     assert!(matches, "{name}: {detail}");
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use sonate_testkit::generators::canonical_value;
//!
//! proptest! {
//!     #[test]
//!     fn canonical_is_pure(value in canonical_value()) {
//!         prop_assert_eq!(canonicalize(&value)?, canonicalize(&value)?);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use sonate_testkit::fixtures::TestFixture;
//!
//! let fixture = TestFixture::with_seed([1u8; 32]);
//! let receipts = fixture.receipt_chain(3);
//! assert_eq!(receipts[2].chain.chain_length, 3);
//! ```

pub mod anchor;
pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use anchor::MemoryAnchor;
pub use fixtures::{link_chain, multi_party_fixtures, TestFixture};
pub use vectors::{merkle_leaves, receipt_from_vector, receipt_vectors, verify_all_vectors, ReceiptVector};
