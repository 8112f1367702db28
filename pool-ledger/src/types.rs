//! Core types for the pool ledger
//!
//! Hashes travel base64-encoded on the wire; everything else is plain JSON.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A ledger transaction as carried on the wire (JSON object)
pub type Txn = serde_json::Map<String, serde_json::Value>;

/// Ledger identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerId(pub u8);

impl fmt::Display for LedgerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The administrative ledger holding pool membership
pub const POOL_LEDGER_ID: LedgerId = LedgerId(0);

/// Well-known transaction and reply field names
pub mod field {
    /// Signer identity
    pub const IDENTIFIER: &str = "identifier";
    /// Client request id
    pub const REQ_ID: &str = "reqId";
    /// Transaction id
    pub const TXN_ID: &str = "txnId";
    /// Transaction time
    pub const TXN_TIME: &str = "txnTime";
    /// Transaction type
    pub const TXN_TYPE: &str = "type";
    /// Target nym
    pub const TARGET_NYM: &str = "dest";
    /// Nested transaction data
    pub const DATA: &str = "data";
    /// Human readable alias
    pub const ALIAS: &str = "alias";
    /// Raw attribute
    pub const RAW: &str = "raw";
    /// Encrypted attribute
    pub const ENC: &str = "enc";
    /// Attribute hash
    pub const HASH: &str = "hash";
    /// Role of a new identity
    pub const ROLE: &str = "role";
    /// Reference to another transaction
    pub const REF: &str = "ref";
    /// Verification key
    pub const VERKEY: &str = "verkey";
    /// Node stack IP
    pub const NODE_IP: &str = "node_ip";
    /// Node stack port
    pub const NODE_PORT: &str = "node_port";
    /// Client stack IP
    pub const CLIENT_IP: &str = "client_ip";
    /// Client stack port
    pub const CLIENT_PORT: &str = "client_port";
    /// Ledger sequence number (proof field)
    pub const SEQ_NO: &str = "seqNo";
    /// Merkle root (proof field)
    pub const ROOT_HASH: &str = "rootHash";
    /// Audit path (proof field)
    pub const AUDIT_PATH: &str = "auditPath";

    /// Fields that carry the proof rather than the entry itself
    pub const PROOF_FIELDS: [&str; 3] = [SEQ_NO, ROOT_HASH, AUDIT_PATH];
}

/// SHA-256 Merkle root hash
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RootHash([u8; 32]);

impl RootHash {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Encode as base64
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Decode from base64
    pub fn from_base64(encoded: &str) -> crate::Result<Self> {
        let bytes = STANDARD.decode(encoded)?;
        let array: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            crate::Error::Decode(format!("Root hash must be 32 bytes, got {}", b.len()))
        })?;
        Ok(Self(array))
    }
}

impl fmt::Debug for RootHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RootHash({})", self.to_base64())
    }
}

impl fmt::Display for RootHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl Serialize for RootHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for RootHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        RootHash::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}

/// A node's or client's position in one ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStatus {
    /// Which ledger
    #[serde(rename = "ledgerType")]
    pub ledger_id: LedgerId,

    /// Number of transactions in the ledger
    #[serde(rename = "txnSeqNo")]
    pub txn_seq_no: u64,

    /// Merkle root at that size
    #[serde(rename = "merkleRoot")]
    pub merkle_root: RootHash,
}
