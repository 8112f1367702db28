//! Merkle tree and audit-path verification
//!
//! This module provides an append-only Merkle tree with RFC 6962 hashing,
//! audit path generation, and the verifier a client uses to check that one
//! ledger entry is included under a stated root at a stated tree size.
//!
//! # Design
//!
//! - Leaf hash: `SHA256(0x00 || data)`
//! - Node hash: `SHA256(0x01 || left || right)`
//! - Unbalanced trees split at the largest power of two below `n`
//! - Audit paths are ordered from the leaf level upwards

use crate::{types::RootHash, Error, Result};
use sha2::{Digest, Sha256};

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

/// Hash a leaf's serialized bytes
pub fn hash_leaf(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_PREFIX]);
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash a pair of child hashes (used for internal nodes)
pub fn hash_children(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([NODE_PREFIX]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Root of the empty tree
pub fn hash_empty() -> [u8; 32] {
    Sha256::digest(b"").into()
}

/// Largest power of two strictly less than `n` (requires `n > 1`)
fn split_point(n: usize) -> usize {
    let mut k = 1;
    while k << 1 < n {
        k <<= 1;
    }
    k
}

/// Append-only Merkle tree over leaf hashes
#[derive(Debug, Clone, Default)]
pub struct MerkleTree {
    /// Leaf hashes (indexed by position)
    leaves: Vec<[u8; 32]>,
}

impl MerkleTree {
    /// Create empty tree
    pub fn new() -> Self {
        Self { leaves: Vec::new() }
    }

    /// Append serialized leaf data, returning its 1-based sequence number
    pub fn append(&mut self, data: &[u8]) -> u64 {
        self.append_hash(hash_leaf(data))
    }

    /// Append an already hashed leaf
    pub fn append_hash(&mut self, leaf_hash: [u8; 32]) -> u64 {
        self.leaves.push(leaf_hash);
        self.leaves.len() as u64
    }

    /// Get number of leaves
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// Check if tree is empty
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Compute the Merkle root of the whole tree
    pub fn root(&self) -> RootHash {
        RootHash::from_bytes(Self::subtree_root(&self.leaves))
    }

    /// Compute the Merkle root of the first `size` leaves
    pub fn root_at(&self, size: usize) -> Option<RootHash> {
        if size > self.leaves.len() {
            return None;
        }
        Some(RootHash::from_bytes(Self::subtree_root(&self.leaves[..size])))
    }

    fn subtree_root(leaves: &[[u8; 32]]) -> [u8; 32] {
        match leaves.len() {
            0 => hash_empty(),
            1 => leaves[0],
            n => {
                let k = split_point(n);
                let left = Self::subtree_root(&leaves[..k]);
                let right = Self::subtree_root(&leaves[k..]);
                hash_children(&left, &right)
            }
        }
    }

    /// Generate the audit path for a leaf in the tree of the first `size` leaves
    pub fn audit_path(&self, leaf_index: usize, size: usize) -> Option<Vec<[u8; 32]>> {
        if size > self.leaves.len() || leaf_index >= size {
            return None;
        }
        let mut path = Vec::new();
        Self::collect_path(leaf_index, &self.leaves[..size], &mut path);
        Some(path)
    }

    fn collect_path(index: usize, leaves: &[[u8; 32]], path: &mut Vec<[u8; 32]>) {
        let n = leaves.len();
        if n <= 1 {
            return;
        }

        let k = split_point(n);
        if index < k {
            Self::collect_path(index, &leaves[..k], path);
            path.push(Self::subtree_root(&leaves[k..]));
        } else {
            Self::collect_path(index - k, &leaves[k..], path);
            path.push(Self::subtree_root(&leaves[..k]));
        }
    }
}

/// Inclusion proof for one ledger entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditProof {
    /// 1-based sequence number of the entry; also the tree size proven against
    pub seq_no: u64,
    /// Root hash at `seq_no`
    pub root_hash: RootHash,
    /// Sibling hashes from the leaf upwards
    pub audit_path: Vec<[u8; 32]>,
    /// Serialized entry
    pub leaf: Vec<u8>,
}

impl AuditProof {
    /// Verify the entry is included at `seq_no - 1` in a tree of size `seq_no`
    pub fn verify(&self) -> Result<()> {
        if self.seq_no == 0 {
            return Err(Error::Proof("Sequence numbers start at 1".to_string()));
        }
        MerkleVerifier.verify_leaf_inclusion(
            &self.leaf,
            self.seq_no - 1,
            &self.audit_path,
            self.seq_no,
            &self.root_hash,
        )
    }
}

/// Verifier for RFC 6962 audit paths
#[derive(Debug, Clone, Copy, Default)]
pub struct MerkleVerifier;

impl MerkleVerifier {
    /// Verify inclusion of serialized leaf data
    pub fn verify_leaf_inclusion(
        &self,
        leaf: &[u8],
        leaf_index: u64,
        audit_path: &[[u8; 32]],
        tree_size: u64,
        root_hash: &RootHash,
    ) -> Result<()> {
        self.verify_leaf_hash_inclusion(
            &hash_leaf(leaf),
            leaf_index,
            audit_path,
            tree_size,
            root_hash,
        )
    }

    /// Verify inclusion of an already hashed leaf
    pub fn verify_leaf_hash_inclusion(
        &self,
        leaf_hash: &[u8; 32],
        leaf_index: u64,
        audit_path: &[[u8; 32]],
        tree_size: u64,
        root_hash: &RootHash,
    ) -> Result<()> {
        if leaf_index >= tree_size {
            return Err(Error::Proof(format!(
                "Index {} is out of range for tree of size {}",
                leaf_index, tree_size
            )));
        }

        let calculated = Self::root_from_audit_path(leaf_hash, leaf_index, audit_path, tree_size)?;
        if calculated != *root_hash.as_bytes() {
            return Err(Error::Proof(format!(
                "Calculated root {} does not match expected root {}",
                RootHash::from_bytes(calculated),
                root_hash
            )));
        }

        Ok(())
    }

    fn root_from_audit_path(
        leaf_hash: &[u8; 32],
        leaf_index: u64,
        audit_path: &[[u8; 32]],
        tree_size: u64,
    ) -> Result<[u8; 32]> {
        let mut calculated = *leaf_hash;
        let mut node_index = leaf_index;
        let mut last_node = tree_size - 1;
        let mut siblings = audit_path.iter();

        while last_node > 0 {
            if node_index % 2 == 1 {
                let sibling = siblings.next().ok_or_else(|| {
                    Error::Proof(format!("Proof too short: left with node index {}", node_index))
                })?;
                calculated = hash_children(sibling, &calculated);
            } else if node_index < last_node {
                let sibling = siblings.next().ok_or_else(|| {
                    Error::Proof(format!("Proof too short: left with node index {}", node_index))
                })?;
                calculated = hash_children(&calculated, sibling);
            }
            // Even rightmost node has no sibling at this level; it is carried up.
            node_index /= 2;
            last_node /= 2;
        }

        let leftover = siblings.len();
        if leftover > 0 {
            return Err(Error::Proof(format!(
                "Proof too long: left with {} hashes",
                leftover
            )));
        }

        Ok(calculated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_of(n: usize) -> MerkleTree {
        let mut tree = MerkleTree::new();
        for i in 0..n {
            tree.append(format!("leaf{}", i).as_bytes());
        }
        tree
    }

    #[test]
    fn test_empty_tree() {
        let tree = MerkleTree::new();
        assert!(tree.is_empty());
        assert_eq!(tree.len(), 0);
        assert_eq!(tree.root(), RootHash::from_bytes(hash_empty()));
    }

    #[test]
    fn test_single_leaf() {
        let mut tree = MerkleTree::new();
        tree.append(b"leaf1");

        assert_eq!(tree.len(), 1);
        assert_eq!(*tree.root().as_bytes(), hash_leaf(b"leaf1"));
        assert_eq!(tree.audit_path(0, 1).unwrap().len(), 0);
    }

    #[test]
    fn test_three_leaves_unbalanced() {
        let tree = tree_of(3);

        // Split at 2: the third leaf is promoted, not duplicated
        let h0 = hash_leaf(b"leaf0");
        let h1 = hash_leaf(b"leaf1");
        let h2 = hash_leaf(b"leaf2");
        let expected = hash_children(&hash_children(&h0, &h1), &h2);

        assert_eq!(*tree.root().as_bytes(), expected);
        assert_eq!(tree.audit_path(2, 3).unwrap(), vec![hash_children(&h0, &h1)]);
    }

    #[test]
    fn test_domain_separation() {
        // A leaf whose bytes equal two child hashes must not hash like the node
        let h0 = hash_leaf(b"a");
        let h1 = hash_leaf(b"b");
        let mut concatenated = Vec::new();
        concatenated.extend_from_slice(&h0);
        concatenated.extend_from_slice(&h1);
        assert_ne!(hash_leaf(&concatenated), hash_children(&h0, &h1));
    }

    #[test]
    fn test_every_leaf_verifies() {
        for size in 1..=17 {
            let tree = tree_of(size);
            let root = tree.root();
            for index in 0..size {
                let path = tree.audit_path(index, size).unwrap();
                let leaf = format!("leaf{}", index);
                MerkleVerifier
                    .verify_leaf_inclusion(leaf.as_bytes(), index as u64, &path, size as u64, &root)
                    .unwrap();
            }
        }
    }

    #[test]
    fn test_root_at_prefix() {
        let tree = tree_of(6);
        assert_eq!(tree.root_at(4).unwrap(), tree_of(4).root());
        assert!(tree.root_at(7).is_none());
    }

    #[test]
    fn test_wrong_leaf_fails() {
        let tree = tree_of(5);
        let path = tree.audit_path(3, 5).unwrap();
        let result = MerkleVerifier.verify_leaf_inclusion(b"leaf4", 3, &path, 5, &tree.root());
        assert!(matches!(result, Err(Error::Proof(_))));
    }

    #[test]
    fn test_proof_too_short() {
        let tree = tree_of(8);
        let mut path = tree.audit_path(5, 8).unwrap();
        path.pop();
        let err = MerkleVerifier
            .verify_leaf_inclusion(b"leaf5", 5, &path, 8, &tree.root())
            .unwrap_err();
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn test_proof_too_long() {
        let tree = tree_of(4);
        let mut path = tree.audit_path(1, 4).unwrap();
        path.push([9u8; 32]);
        let err = MerkleVerifier
            .verify_leaf_inclusion(b"leaf1", 1, &path, 4, &tree.root())
            .unwrap_err();
        assert!(err.to_string().contains("too long"));
    }

    #[test]
    fn test_index_out_of_range() {
        let tree = tree_of(2);
        let err = MerkleVerifier
            .verify_leaf_inclusion(b"leaf1", 2, &[], 2, &tree.root())
            .unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_audit_proof_verify() {
        let tree = tree_of(7);
        let proof = AuditProof {
            seq_no: 7,
            root_hash: tree.root(),
            audit_path: tree.audit_path(6, 7).unwrap(),
            leaf: b"leaf6".to_vec(),
        };
        assert!(proof.verify().is_ok());

        let zero = AuditProof { seq_no: 0, ..proof };
        assert!(zero.verify().is_err());
    }
}
