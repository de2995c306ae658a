//! # SONATE Receipts
//!
//! Trust receipts and collaboration ledgers on top of `sonate-core`.
//!
//! ## Overview
//!
//! - **Receipts**: one signed, content-addressed record per AI interaction,
//!   chained per session through `chain.previous_hash`
//! - **Verification**: schema, id, chain hash and signature checks, plus
//!   continuity across a batch
//! - **Collaboration**: agents, work units and human decisions, chained and
//!   aggregated into a Merkle manifest
//! - **Export**: JSON, JSONL, CSV, Splunk and Datadog renderings
//!
//! ## Usage
//!
//! ```rust
//! use sonate_receipts::{build_receipt, verify_receipt, ChainMeta, InteractionPayload,
//!     ReceiptDraft, VerifyOptions};
//! use sonate_receipts::core::Keypair;
//!
//! let keypair = Keypair::generate();
//! let draft = ReceiptDraft::new("session-1", InteractionPayload::exchange("hi", "hello", "m"))
//!     .agent("did:agent:1")
//!     .human("did:human:1");
//! let receipt = build_receipt(draft, ChainMeta::genesis(), Some(&keypair))
//!     .unwrap()
//!     .into_receipt();
//!
//! let report = verify_receipt(
//!     &receipt,
//!     &VerifyOptions::default().with_public_key(keypair.public_key()),
//! );
//! assert!(report.is_valid());
//! ```

pub mod assembler;
pub mod collab;
pub mod error;
pub mod export;
pub mod receipt;
pub mod verify;

// Re-export component crates
pub use sonate_core as core;
pub use sonate_store as store;

pub use assembler::{
    build_receipt, Assembler, AssemblerConfig, BuiltReceipt, ReceiptDraft, ReceiptSigner,
};
pub use collab::{
    agent_id, Agent, AgentDirectory, CollaborationLedger, Decision, LedgerConfig, Manifest,
    Verdict, WorkUnit,
};
pub use error::{ReceiptError, Result, SchemaError};
pub use export::{export_receipts, ExportFormat};
pub use receipt::{ChainMeta, InteractionPayload, Receipt, GENESIS, RECEIPT_VERSION, UNSIGNED_ID};
pub use verify::{
    check_receipt_json, verify_receipt, verify_receipt_json, verify_receipts,
    verify_receipts_json, BatchVerification, LinkCheck, ReceiptVerification, VerifyOptions,
};
