//! Error types for the pool client

use thiserror::Error;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Client errors
///
/// Quorum outcomes (`NotFound`, `Unconfirmed`, disagreement) are not errors;
/// see [`crate::quorum::ConsensusOutcome`].
#[derive(Error, Debug)]
pub enum Error {
    /// Replica set cannot tolerate any configuration
    #[error("Invalid topology: {total_replicas} replicas")]
    InvalidTopology {
        /// Configured replica count
        total_replicas: usize,
    },

    /// Both a single signer and a signer map were supplied
    #[error("Only one of 'signer' or 'signers' can be used")]
    AmbiguousSigner,

    /// No signer registered for the identifier
    #[error("No signer for identifier: {0}")]
    NoSuchIdentity(String),

    /// Merkle proof of a reply failed to verify
    #[error("Proof of reply {index} invalid: {source}")]
    Proof {
        /// Position of the failing reply in the verified batch
        index: usize,
        /// Underlying verification failure
        #[source]
        source: pool_ledger::Error,
    },

    /// Reserved pool-protocol message that could not be classified
    #[error("Unknown message kind: {0}")]
    UnknownMessageKind(String),

    /// Ledger error
    #[error("Ledger error: {0}")]
    Ledger(#[from] pool_ledger::Error),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Invalid argument to an administrative operation
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Metrics registration error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
