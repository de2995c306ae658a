//! # SONATE Store
//!
//! SQLite persistence for SONATE hash chains.
//!
//! ## Overview
//!
//! [`SqliteLinkStore`] implements the core [`LinkStore`](sonate_core::LinkStore)
//! trait, so any [`HashChain`](sonate_core::HashChain) can be backed by a file
//! and audited again after a restart.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sonate_core::{genesis_hash, LinkSpec};
//! use sonate_store::open_chain;
//!
//! let chain = open_chain("audit.db").unwrap();
//! let genesis = genesis_hash("session-42");
//! let link = chain.create_link(LinkSpec::after(&genesis, "first record")).unwrap();
//! assert!(chain.verify_chain(&link.hash, &genesis).unwrap().valid);
//! ```
//!
//! ## Design Notes
//!
//! - **Verbatim rows**: links are never recomputed on load
//! - **Idempotent inserts**: a duplicate hash returns `AlreadyExists`
//! - **Atomic batches**: `insert_links` runs in one transaction

pub mod error;
pub mod migration;
pub mod sqlite;

pub use error::{Result, StoreError};
pub use sqlite::{open_chain, SqliteLinkStore};
