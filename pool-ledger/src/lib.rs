//! Pool Ledger
//!
//! Ledger-side primitives used by the pool client: the append-only pool
//! ledger view, RFC 6962 Merkle trees and audit-path verification, the compact
//! leaf serializer, and ed25519 key pairs.
//!
//! # Architecture
//!
//! - **Merkle Tree**: `SHA256(0x00 || leaf)` leaves, `SHA256(0x01 || l || r)` nodes
//! - **Audit Paths**: inclusion of one entry under a stated root at a stated size
//! - **Compact Serialization**: ordered `|`-joined fields, the bytes that get hashed
//! - **Pool Ledger**: in-memory view of the administrative (membership) ledger
//!
//! # Invariants
//!
//! - Append-only: entries are never modified or deleted
//! - Sequence numbers start at 1 and are contiguous
//! - A proof that fails to verify is always an error, never a `false`

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod crypto;
pub mod error;
pub mod ledger;
pub mod merkle;
pub mod serializer;
pub mod types;

// Re-exports
pub use error::{Error, Result};
pub use ledger::PoolLedger;
pub use merkle::{AuditProof, MerkleTree, MerkleVerifier};
pub use serializer::CompactSerializer;
pub use types::{LedgerId, LedgerStatus, RootHash, Txn, POOL_LEDGER_ID};
