//! In-memory view of the pool ledger
//!
//! The client keeps its own copy of the administrative ledger so it can
//! announce its position (`LedgerStatus`) to replicas and learn membership
//! changes. Entries are serialized with the compact serializer and hashed
//! into an RFC 6962 tree as they are appended.
//!
//! # Example
//!
//! ```
//! use pool_ledger::PoolLedger;
//! use serde_json::json;
//!
//! let mut ledger = PoolLedger::new();
//! let txn = json!({"type": "NEW_NODE", "dest": "abc"}).as_object().cloned().unwrap();
//! let seq_no = ledger.append(txn).unwrap();
//! assert_eq!(seq_no, 1);
//! assert!(ledger.proof(1).unwrap().verify().is_ok());
//! ```

use crate::{
    merkle::{AuditProof, MerkleTree},
    serializer::CompactSerializer,
    types::{field, LedgerStatus, RootHash, Txn, POOL_LEDGER_ID},
    Error, Result,
};
use std::path::Path;

/// Append-only pool ledger
#[derive(Debug, Clone, Default)]
pub struct PoolLedger {
    /// Entries in sequence order (seq_no = index + 1)
    txns: Vec<Txn>,

    /// Merkle tree over serialized entries
    tree: MerkleTree,

    /// Leaf serializer
    serializer: CompactSerializer,
}

impl PoolLedger {
    /// Create empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Create ledger from genesis transactions, in order
    pub fn from_genesis(txns: impl IntoIterator<Item = Txn>) -> Result<Self> {
        let mut ledger = Self::new();
        for txn in txns {
            ledger.append(txn)?;
        }
        Ok(ledger)
    }

    /// Load genesis transactions from a file with one JSON object per line
    pub fn load_genesis_file(path: impl AsRef<Path>) -> Result<Vec<Txn>> {
        let content = std::fs::read_to_string(path)?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                let value: serde_json::Value = serde_json::from_str(line)?;
                match value {
                    serde_json::Value::Object(txn) => Ok(txn),
                    other => Err(Error::InvalidEntry(format!(
                        "Genesis entry is not an object: {}",
                        other
                    ))),
                }
            })
            .collect()
    }

    /// Append an entry, returning its sequence number
    ///
    /// Proof fields are never part of a stored entry.
    pub fn append(&mut self, mut txn: Txn) -> Result<u64> {
        for name in field::PROOF_FIELDS {
            txn.remove(name);
        }
        if txn.is_empty() {
            return Err(Error::InvalidEntry("Cannot append empty entry".to_string()));
        }

        let leaf = self.serializer.serialize(&txn);
        let seq_no = self.tree.append(&leaf);
        self.txns.push(txn);

        tracing::debug!("Pool ledger appended entry {}", seq_no);
        Ok(seq_no)
    }

    /// Number of entries
    pub fn size(&self) -> u64 {
        self.txns.len() as u64
    }

    /// Check if ledger is empty
    pub fn is_empty(&self) -> bool {
        self.txns.is_empty()
    }

    /// Current Merkle root
    pub fn root_hash(&self) -> RootHash {
        self.tree.root()
    }

    /// Position of this ledger, as announced to replicas
    pub fn status(&self) -> LedgerStatus {
        LedgerStatus {
            ledger_id: POOL_LEDGER_ID,
            txn_seq_no: self.size(),
            merkle_root: self.root_hash(),
        }
    }

    /// Get entry by sequence number
    pub fn get(&self, seq_no: u64) -> Option<&Txn> {
        let index = usize::try_from(seq_no.checked_sub(1)?).ok()?;
        self.txns.get(index)
    }

    /// Iterate entries in sequence order
    pub fn iter(&self) -> impl Iterator<Item = &Txn> {
        self.txns.iter()
    }

    /// Inclusion proof for an entry against the tree of size `seq_no`
    pub fn proof(&self, seq_no: u64) -> Option<AuditProof> {
        let txn = self.get(seq_no)?;
        let size = seq_no as usize;
        Some(AuditProof {
            seq_no,
            root_hash: self.tree.root_at(size)?,
            audit_path: self.tree.audit_path(size - 1, size)?,
            leaf: self.serializer.serialize(txn),
        })
    }

    /// Leaf serializer
    pub fn serializer(&self) -> &CompactSerializer {
        &self.serializer
    }
}
