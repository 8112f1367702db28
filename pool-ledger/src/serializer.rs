//! Compact serialization for ledger entries
//!
//! Produces the deterministic bytes that are hashed into Merkle leaves.
//! Known fields are written in a fixed order, `|`-delimited, with absent
//! fields left empty. Fields outside the ordered set are appended after them
//! as `key=value` in key order, so no part of an entry escapes the hash.

use crate::types::{field, Txn};
use serde_json::Value;

const DELIMITER: u8 = b'|';

/// Field order used for transactions on every ledger
pub fn txn_ordered_fields() -> Vec<String> {
    [
        field::IDENTIFIER,
        field::REQ_ID,
        field::TXN_ID,
        field::TXN_TIME,
        field::TXN_TYPE,
        field::TARGET_NYM,
        field::DATA,
        field::ALIAS,
        field::RAW,
        field::ENC,
        field::HASH,
        field::ROLE,
        field::REF,
    ]
    .iter()
    .map(|name| name.to_string())
    .collect()
}

/// Compact serializer
#[derive(Debug, Clone)]
pub struct CompactSerializer {
    fields: Vec<String>,
}

impl CompactSerializer {
    /// Create serializer with an explicit field order
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }

    /// Ordered fields
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Serialize an entry to canonical bytes
    pub fn serialize(&self, entry: &Txn) -> Vec<u8> {
        let mut parts: Vec<String> = self
            .fields
            .iter()
            .map(|name| entry.get(name).map(encode_value).unwrap_or_default())
            .collect();

        // serde_json::Map iterates in key order
        for (key, value) in entry {
            if !self.fields.iter().any(|name| name == key) {
                parts.push(format!("{}={}", key, encode_value(value)));
            }
        }

        let mut bytes = Vec::new();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                bytes.push(DELIMITER);
            }
            bytes.extend_from_slice(part.as_bytes());
        }
        bytes
    }
}

impl Default for CompactSerializer {
    fn default() -> Self {
        Self::new(txn_ordered_fields())
    }
}

fn encode_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        nested => nested.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn txn(value: Value) -> Txn {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_ordered_fields() {
        let serializer = CompactSerializer::new(vec!["a".into(), "b".into(), "c".into()]);
        let entry = txn(json!({"c": "3", "a": "1", "b": 2}));
        assert_eq!(serializer.serialize(&entry), b"1|2|3".to_vec());
    }

    #[test]
    fn test_missing_fields_are_empty() {
        let serializer = CompactSerializer::new(vec!["a".into(), "b".into(), "c".into()]);
        let entry = txn(json!({"c": "3"}));
        assert_eq!(serializer.serialize(&entry), b"||3".to_vec());
    }

    #[test]
    fn test_extra_fields_appended_in_key_order() {
        let serializer = CompactSerializer::new(vec!["a".into()]);
        let entry = txn(json!({"z": 1, "a": "x", "m": true}));
        assert_eq!(serializer.serialize(&entry), b"x|m=true|z=1".to_vec());
    }

    #[test]
    fn test_nested_data_is_json() {
        let serializer = CompactSerializer::default();
        let entry = txn(json!({
            "type": "NEW_NODE",
            "data": {"alias": "Alpha", "node_port": 9701}
        }));
        let bytes = serializer.serialize(&entry);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains(r#"{"alias":"Alpha","node_port":9701}"#));
        assert!(text.contains("NEW_NODE"));
    }

    #[test]
    fn test_deterministic() {
        let serializer = CompactSerializer::default();
        let entry = txn(json!({"identifier": "id", "reqId": 7, "type": "NYM"}));
        assert_eq!(serializer.serialize(&entry), serializer.serialize(&entry.clone()));
    }
}
