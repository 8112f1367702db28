//! Pool Client
//!
//! Client-side engine of a Byzantine fault tolerant replica pool: submits
//! signed requests, collects independent replies, and decides when enough
//! replicas agree to trust a result.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Replica Pool                         │
//! │      Alpha | Beta | Gamma | Delta  (n = 3f + 1)      │
//! └────────────────────┬────────────────────────────────┘
//!                      │ Transport events
//!                      ↓
//! ┌─────────────────────────────────────────────────────┐
//! │              Client                                  │
//! │  Readiness gate → Inbox → Quorum resolver           │
//! │  Pool messages  → Catch-up coordinator              │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//!                      ↓
//! ┌─────────────────────────────────────────────────────┐
//! │              Pool Ledger                             │
//! │  Membership view + Merkle proofs                    │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Byzantine Fault Tolerance
//!
//! - Tolerates `f = (n - 1) / 3` faulty replicas
//! - Requests are dispatched once `f + 1` replicas are connected
//! - A result is confirmed once more than `f` replicas return it
//! - Reply entries are checked against Merkle audit paths

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod admin;
pub mod catchup;
pub mod client;
pub mod config;
pub mod error;
pub mod fault;
pub mod inbox;
pub mod message;
pub mod metrics;
pub mod proof;
pub mod quorum;
pub mod readiness;
pub mod registry;
pub mod transport;
pub mod types;
pub mod wallet;

// Re-exports
pub use catchup::{CatchupCoordinator, LedgerManager, LedgerManagerEvent, StatusQuorumManager};
pub use client::{Client, ClientBuilder, SharedClient};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use fault::FaultParameters;
pub use message::{ClientMessage, NodeMessage, Reply};
pub use proof::verify_merkle_proof;
pub use quorum::{ConsensusOutcome, ReplyStatus};
pub use readiness::{ReadinessState, SyncMode};
pub use registry::{RegistryCommand, ReplicaInfo, ReplicaRegistry};
pub use transport::{MemoryTransport, Transport, TransportEvent};
pub use types::{HostAddress, Identifier, ReplicaId, Request, RequestId, Role};
pub use wallet::{SimpleSigner, Signer, Wallet};
