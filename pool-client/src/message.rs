//! Messages exchanged with replicas
//!
//! Inbound messages arrive as decoded JSON objects tagged by `op`. They are
//! classified once into [`NodeMessage`]; pool-protocol kinds get typed bodies,
//! everything unrecognized is kept as [`NodeMessage::Other`].

use crate::{
    types::{Request, RequestId},
    Error, Result,
};
use pool_ledger::{
    types::{field, LedgerId, LedgerStatus, RootHash, Txn},
    AuditProof,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Field carrying the message kind
pub const OP_FIELD: &str = "op";
/// Field carrying a reply's result
pub const RESULT_FIELD: &str = "result";

/// Inbound message kind, by `op` tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Reply to a client request
    Reply,
    /// Newly ordered pool ledger transaction
    PoolLedgerTxns,
    /// A replica's ledger position
    LedgerStatus,
    /// Consistency proof between two ledger sizes
    ConsistencyProof,
    /// Batch of catch-up transactions
    CatchupRep,
    /// Anything else
    Other,
}

impl MessageKind {
    /// Classify a message by its `op` field
    pub fn of(message: &Value) -> Self {
        match message.get(OP_FIELD).and_then(Value::as_str) {
            Some("REPLY") => MessageKind::Reply,
            Some("POOL_LEDGER_TXNS") => MessageKind::PoolLedgerTxns,
            Some("LEDGER_STATUS") => MessageKind::LedgerStatus,
            Some("CONSISTENCY_PROOF") => MessageKind::ConsistencyProof,
            Some("CATCHUP_REP") => MessageKind::CatchupRep,
            _ => MessageKind::Other,
        }
    }

    /// Wire tag
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Reply => "REPLY",
            MessageKind::PoolLedgerTxns => "POOL_LEDGER_TXNS",
            MessageKind::LedgerStatus => "LEDGER_STATUS",
            MessageKind::ConsistencyProof => "CONSISTENCY_PROOF",
            MessageKind::CatchupRep => "CATCHUP_REP",
            MessageKind::Other => "OTHER",
        }
    }

    /// Pool-protocol kinds, handled by catch-up rather than shown to users
    pub fn is_pool(&self) -> bool {
        matches!(
            self,
            MessageKind::PoolLedgerTxns
                | MessageKind::LedgerStatus
                | MessageKind::ConsistencyProof
                | MessageKind::CatchupRep
        )
    }
}

/// Reply from one replica
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    /// Result object; compared structurally for quorum
    pub result: Txn,
}

impl Reply {
    /// Decode a reply from a raw message
    pub fn from_value(message: &Value) -> Result<Self> {
        let result = message
            .get(RESULT_FIELD)
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| Error::UnknownMessageKind("REPLY without result".to_string()))?;
        Ok(Self { result })
    }

    /// Request this reply answers
    pub fn req_id(&self) -> Option<RequestId> {
        request_id_of(&self.result)
    }

    /// Merkle proof carried in the result
    pub fn audit_proof(
        &self,
        serializer: &pool_ledger::CompactSerializer,
    ) -> pool_ledger::Result<AuditProof> {
        let seq_no = self
            .result
            .get(field::SEQ_NO)
            .and_then(Value::as_u64)
            .ok_or_else(|| proof_error("Reply has no seqNo"))?;

        let root_hash = self
            .result
            .get(field::ROOT_HASH)
            .and_then(Value::as_str)
            .ok_or_else(|| proof_error("Reply has no rootHash"))?;
        let root_hash = RootHash::from_base64(root_hash)?;

        let audit_path = self
            .result
            .get(field::AUDIT_PATH)
            .and_then(Value::as_array)
            .ok_or_else(|| proof_error("Reply has no auditPath"))?
            .iter()
            .map(decode_hash)
            .collect::<pool_ledger::Result<Vec<_>>>()?;

        let mut leaf = self.result.clone();
        for name in field::PROOF_FIELDS {
            leaf.remove(name);
        }

        Ok(AuditProof {
            seq_no,
            root_hash,
            audit_path,
            leaf: serializer.serialize(&leaf),
        })
    }
}

fn proof_error(msg: &str) -> pool_ledger::Error {
    pool_ledger::Error::Proof(msg.to_string())
}

fn decode_hash(value: &Value) -> pool_ledger::Result<[u8; 32]> {
    let encoded = value
        .as_str()
        .ok_or_else(|| proof_error("Audit path entry is not a string"))?;
    let bytes = STANDARD.decode(encoded)?;
    bytes
        .try_into()
        .map_err(|_| proof_error("Audit path entry is not 32 bytes"))
}

/// Request id of a reply result, if present
pub fn request_id_of(result: &Txn) -> Option<RequestId> {
    result
        .get(field::REQ_ID)
        .and_then(Value::as_u64)
        .map(RequestId)
}

/// A newly ordered pool ledger transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolLedgerTxns {
    /// The transaction
    pub txn: Txn,
}

/// Proof that a ledger grew consistently between two sizes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyProof {
    /// Which ledger
    #[serde(rename = "ledgerType")]
    pub ledger_id: LedgerId,
    /// Size the proof starts from
    pub seq_no_start: u64,
    /// Size the proof ends at
    pub seq_no_end: u64,
    /// Root at `seq_no_start`
    pub old_merkle_root: String,
    /// Root at `seq_no_end`
    pub new_merkle_root: String,
    /// Consistency hashes
    #[serde(default)]
    pub hashes: Vec<String>,
}

/// Catch-up transactions keyed by sequence number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchupRep {
    /// Which ledger
    #[serde(rename = "ledgerType")]
    pub ledger_id: LedgerId,
    /// Transactions keyed by decimal sequence number
    pub txns: BTreeMap<String, Txn>,
    /// Consistency proof for the batch
    #[serde(rename = "consProof", default)]
    pub cons_proof: Vec<String>,
}

impl CatchupRep {
    /// Transactions in sequence order; keys that are not numbers are skipped
    pub fn ordered_txns(&self) -> Vec<(u64, &Txn)> {
        let mut txns: Vec<(u64, &Txn)> = self
            .txns
            .iter()
            .filter_map(|(seq_no, txn)| seq_no.parse().ok().map(|n| (n, txn)))
            .collect();
        txns.sort_by_key(|(seq_no, _)| *seq_no);
        txns
    }
}

/// Inbound message from a replica
#[derive(Debug, Clone, PartialEq)]
pub enum NodeMessage {
    /// Reply to a request
    Reply(Reply),
    /// Newly ordered pool transaction
    PoolLedgerTxns(PoolLedgerTxns),
    /// Ledger position
    LedgerStatus(LedgerStatus),
    /// Consistency proof
    ConsistencyProof(ConsistencyProof),
    /// Catch-up batch
    CatchupRep(CatchupRep),
    /// Unrecognized message, kept verbatim
    Other(Value),
}

impl NodeMessage {
    /// Decode a raw message
    ///
    /// A reserved kind whose body does not decode fails with
    /// [`Error::UnknownMessageKind`].
    pub fn decode(message: Value) -> Result<Self> {
        let kind = MessageKind::of(&message);
        match kind {
            MessageKind::Reply => Reply::from_value(&message).map(NodeMessage::Reply),
            MessageKind::PoolLedgerTxns => body(kind, message).map(NodeMessage::PoolLedgerTxns),
            MessageKind::LedgerStatus => body(kind, message).map(NodeMessage::LedgerStatus),
            MessageKind::ConsistencyProof => body(kind, message).map(NodeMessage::ConsistencyProof),
            MessageKind::CatchupRep => body(kind, message).map(NodeMessage::CatchupRep),
            MessageKind::Other => Ok(NodeMessage::Other(message)),
        }
    }

    /// Kind of this message
    pub fn kind(&self) -> MessageKind {
        match self {
            NodeMessage::Reply(_) => MessageKind::Reply,
            NodeMessage::PoolLedgerTxns(_) => MessageKind::PoolLedgerTxns,
            NodeMessage::LedgerStatus(_) => MessageKind::LedgerStatus,
            NodeMessage::ConsistencyProof(_) => MessageKind::ConsistencyProof,
            NodeMessage::CatchupRep(_) => MessageKind::CatchupRep,
            NodeMessage::Other(_) => MessageKind::Other,
        }
    }
}

fn body<T: serde::de::DeserializeOwned>(kind: MessageKind, message: Value) -> Result<T> {
    serde_json::from_value(message)
        .map_err(|e| Error::UnknownMessageKind(format!("{}: {}", kind.as_str(), e)))
}

/// Outbound message to replicas
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Signed client request
    Request(Request),
    /// The client's pool ledger position
    LedgerStatus(LedgerStatus),
    /// Arbitrary message passed through as-is
    Raw(Value),
}

impl ClientMessage {
    /// Wire form
    pub fn to_value(&self) -> Result<Value> {
        let value = match self {
            ClientMessage::Request(request) => serde_json::to_value(request)?,
            ClientMessage::LedgerStatus(status) => {
                let mut value = serde_json::to_value(status)?;
                if let Value::Object(map) = &mut value {
                    map.insert(OP_FIELD.to_string(), Value::from("LEDGER_STATUS"));
                }
                value
            }
            ClientMessage::Raw(value) => value.clone(),
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pool_ledger::{MerkleTree, POOL_LEDGER_ID};
    use serde_json::json;

    #[test]
    fn test_classify_kinds() {
        assert_eq!(MessageKind::of(&json!({"op": "REPLY"})), MessageKind::Reply);
        assert_eq!(
            MessageKind::of(&json!({"op": "CATCHUP_REP"})),
            MessageKind::CatchupRep
        );
        assert_eq!(MessageKind::of(&json!({"op": "NACK"})), MessageKind::Other);
        assert_eq!(MessageKind::of(&json!({"x": 1})), MessageKind::Other);
        assert!(MessageKind::LedgerStatus.is_pool());
        assert!(!MessageKind::Reply.is_pool());
    }

    #[test]
    fn test_decode_reply() {
        let message = json!({"op": "REPLY", "result": {"reqId": 7, "txnId": "t"}});
        match NodeMessage::decode(message).unwrap() {
            NodeMessage::Reply(reply) => assert_eq!(reply.req_id(), Some(RequestId(7))),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_ledger_status() {
        let status = LedgerStatus {
            ledger_id: POOL_LEDGER_ID,
            txn_seq_no: 4,
            merkle_root: MerkleTree::new().root(),
        };
        let mut value = serde_json::to_value(&status).unwrap();
        value["op"] = json!("LEDGER_STATUS");
        assert_eq!(
            NodeMessage::decode(value).unwrap(),
            NodeMessage::LedgerStatus(status)
        );
    }

    #[test]
    fn test_malformed_reserved_kind() {
        let result = NodeMessage::decode(json!({"op": "LEDGER_STATUS", "txnSeqNo": "x"}));
        assert!(matches!(result, Err(Error::UnknownMessageKind(_))));
    }

    #[test]
    fn test_unknown_kept_verbatim() {
        let message = json!({"op": "REQNACK", "reason": "bad"});
        assert_eq!(
            NodeMessage::decode(message.clone()).unwrap(),
            NodeMessage::Other(message)
        );
    }

    #[test]
    fn test_catchup_rep_order() {
        let rep: CatchupRep = serde_json::from_value(json!({
            "op": "CATCHUP_REP",
            "ledgerType": 0,
            "txns": {"10": {"type": "B"}, "9": {"type": "A"}},
            "consProof": []
        }))
        .unwrap();
        let ordered = rep.ordered_txns();
        assert_eq!(ordered[0].0, 9);
        assert_eq!(ordered[1].0, 10);
    }

    #[test]
    fn test_ledger_status_outbound_tagged() {
        let status = LedgerStatus {
            ledger_id: POOL_LEDGER_ID,
            txn_seq_no: 0,
            merkle_root: MerkleTree::new().root(),
        };
        let value = ClientMessage::LedgerStatus(status).to_value().unwrap();
        assert_eq!(value["op"], "LEDGER_STATUS");
        assert_eq!(value["txnSeqNo"], 0);
    }
}
