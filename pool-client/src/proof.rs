//! Merkle proof verification of replies

use crate::{message::Reply, Error, Result};
use pool_ledger::CompactSerializer;

/// Verify the inclusion proof carried by every reply
///
/// Each reply's result must hold `seqNo`, a base64 `rootHash` and a base64
/// `auditPath`; the remaining fields are the ledger entry. Stops at the first
/// reply that fails, reporting its position.
pub fn verify_merkle_proof(replies: &[Reply]) -> Result<()> {
    let serializer = CompactSerializer::default();
    for (index, reply) in replies.iter().enumerate() {
        reply
            .audit_proof(&serializer)
            .and_then(|proof| proof.verify())
            .map_err(|source| Error::Proof { index, source })?;
    }
    Ok(())
}
