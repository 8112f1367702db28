//! Versioned replica registry
//!
//! Membership is only ever changed by applying a [`RegistryCommand`]. Commands
//! come either from a static configuration or from pool ledger transactions
//! (`NEW_NODE`, `CHANGE_HA`, `CHANGE_KEYS`), applied in ledger order.

use crate::{
    types::{HostAddress, ReplicaId},
    Error, Result,
};
use pool_ledger::types::{field, Txn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Pool transaction adding a node
pub const NEW_NODE: &str = "NEW_NODE";
/// Pool transaction changing a node's addresses
pub const CHANGE_HA: &str = "CHANGE_HA";
/// Pool transaction changing a node's verification key
pub const CHANGE_KEYS: &str = "CHANGE_KEYS";
/// Domain transaction registering an identity
pub const NYM: &str = "NYM";

/// What the client knows about one replica
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaInfo {
    /// Node-to-node stack address
    #[serde(default)]
    pub node_address: Option<HostAddress>,

    /// Address clients connect to
    pub client_address: HostAddress,

    /// Verification key (base58)
    #[serde(default)]
    pub verkey: Option<String>,

    /// Nym the node was registered under
    #[serde(default)]
    pub nym: Option<String>,
}

impl ReplicaInfo {
    /// Replica known only by its client address
    pub fn with_client_address(client_address: HostAddress) -> Self {
        Self {
            node_address: None,
            client_address,
            verkey: None,
            nym: None,
        }
    }
}

/// Explicit membership change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryCommand {
    /// Add (or replace) a replica
    AddReplica {
        /// Replica name
        id: ReplicaId,
        /// Replica details
        info: ReplicaInfo,
    },

    /// Move a replica to new addresses
    ChangeAddress {
        /// Replica name
        id: ReplicaId,
        /// New node stack address
        node_address: HostAddress,
        /// New client stack address
        client_address: HostAddress,
    },

    /// Rotate a replica's verification key
    ChangeKeys {
        /// Replica name
        id: ReplicaId,
        /// New verification key
        verkey: String,
    },
}

impl RegistryCommand {
    /// Replica the command targets
    pub fn replica(&self) -> &ReplicaId {
        match self {
            RegistryCommand::AddReplica { id, .. }
            | RegistryCommand::ChangeAddress { id, .. }
            | RegistryCommand::ChangeKeys { id, .. } => id,
        }
    }

    /// Derive the membership change carried by a pool ledger transaction
    ///
    /// Returns `Ok(None)` for transaction types that do not touch membership.
    pub fn from_pool_txn(txn: &Txn) -> Result<Option<Self>> {
        let txn_type = match txn.get(field::TXN_TYPE).and_then(Value::as_str) {
            Some(t) => t,
            None => return Ok(None),
        };

        let command = match txn_type {
            NEW_NODE => {
                let data = txn_data(txn)?;
                let verkey = data
                    .get(field::VERKEY)
                    .and_then(Value::as_str)
                    .map(str::to_string);
                RegistryCommand::AddReplica {
                    id: alias(data)?,
                    info: ReplicaInfo {
                        node_address: Some(address(data, field::NODE_IP, field::NODE_PORT)?),
                        client_address: address(data, field::CLIENT_IP, field::CLIENT_PORT)?,
                        verkey,
                        nym: txn
                            .get(field::TARGET_NYM)
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    },
                }
            }
            CHANGE_HA => {
                let data = txn_data(txn)?;
                RegistryCommand::ChangeAddress {
                    id: alias(data)?,
                    node_address: address(data, field::NODE_IP, field::NODE_PORT)?,
                    client_address: address(data, field::CLIENT_IP, field::CLIENT_PORT)?,
                }
            }
            CHANGE_KEYS => {
                let data = txn_data(txn)?;
                let verkey = data
                    .get(field::VERKEY)
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid("CHANGE_KEYS without verkey"))?;
                RegistryCommand::ChangeKeys {
                    id: alias(data)?,
                    verkey: verkey.to_string(),
                }
            }
            _ => return Ok(None),
        };

        Ok(Some(command))
    }
}

fn invalid(msg: &str) -> Error {
    Error::Ledger(pool_ledger::Error::InvalidEntry(msg.to_string()))
}

fn txn_data(txn: &Txn) -> Result<&serde_json::Map<String, Value>> {
    txn.get(field::DATA)
        .and_then(Value::as_object)
        .ok_or_else(|| invalid("Pool transaction without data"))
}

fn alias(data: &serde_json::Map<String, Value>) -> Result<ReplicaId> {
    data.get(field::ALIAS)
        .and_then(Value::as_str)
        .map(ReplicaId::new)
        .ok_or_else(|| invalid("Pool transaction without alias"))
}

fn address(
    data: &serde_json::Map<String, Value>,
    ip_field: &str,
    port_field: &str,
) -> Result<HostAddress> {
    let host = data
        .get(ip_field)
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(&format!("Missing {}", ip_field)))?;
    let port = data
        .get(port_field)
        .and_then(Value::as_u64)
        .and_then(|p| u16::try_from(p).ok())
        .ok_or_else(|| invalid(&format!("Missing or invalid {}", port_field)))?;
    Ok(HostAddress::new(host, port))
}

/// Replica registry with a version bumped on every applied command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicaRegistry {
    replicas: BTreeMap<ReplicaId, ReplicaInfo>,
    version: u64,
}

impl ReplicaRegistry {
    /// Create empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a static registry from client addresses
    pub fn from_addresses(addresses: impl IntoIterator<Item = (ReplicaId, HostAddress)>) -> Self {
        let mut registry = Self::new();
        for (id, address) in addresses {
            registry.apply(RegistryCommand::AddReplica {
                id,
                info: ReplicaInfo::with_client_address(address),
            });
        }
        registry
    }

    /// Apply a command, returning whether the registry changed
    ///
    /// Address and key changes for unknown replicas are ignored.
    pub fn apply(&mut self, command: RegistryCommand) -> bool {
        let applied = match command {
            RegistryCommand::AddReplica { id, info } => {
                tracing::debug!("Registry adding replica {} at {}", id, info.client_address);
                self.replicas.insert(id, info);
                true
            }
            RegistryCommand::ChangeAddress {
                id,
                node_address,
                client_address,
            } => match self.replicas.get_mut(&id) {
                Some(info) => {
                    tracing::debug!("Registry moving replica {} to {}", id, client_address);
                    info.node_address = Some(node_address);
                    info.client_address = client_address;
                    true
                }
                None => {
                    tracing::warn!("Address change for unknown replica {}", id);
                    false
                }
            },
            RegistryCommand::ChangeKeys { id, verkey } => match self.replicas.get_mut(&id) {
                Some(info) => {
                    info.verkey = Some(verkey);
                    true
                }
                None => {
                    tracing::warn!("Key change for unknown replica {}", id);
                    false
                }
            },
        };

        if applied {
            self.version += 1;
        }
        applied
    }

    /// Number of configured replicas
    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    /// Current version
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Check if a replica is configured
    pub fn contains(&self, id: &ReplicaId) -> bool {
        self.replicas.contains_key(id)
    }

    /// Get replica details
    pub fn get(&self, id: &ReplicaId) -> Option<&ReplicaInfo> {
        self.replicas.get(id)
    }

    /// Replica names in order
    pub fn ids(&self) -> impl Iterator<Item = &ReplicaId> {
        self.replicas.keys()
    }

    /// Replicas in name order
    pub fn iter(&self) -> impl Iterator<Item = (&ReplicaId, &ReplicaInfo)> {
        self.replicas.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn txn(value: Value) -> Txn {
        value.as_object().cloned().unwrap()
    }

    fn new_node(alias: &str, port: u16) -> Txn {
        txn(json!({
            "type": "NEW_NODE",
            "dest": format!("nym-{}", alias),
            "data": {
                "alias": alias,
                "node_ip": "10.0.0.1",
                "node_port": port,
                "client_ip": "10.0.0.1",
                "client_port": port + 1
            }
        }))
    }

    #[test]
    fn test_static_registry() {
        let registry = ReplicaRegistry::from_addresses(vec![
            (ReplicaId::new("Alpha"), HostAddress::new("127.0.0.1", 9702)),
            (ReplicaId::new("Beta"), HostAddress::new("127.0.0.1", 9704)),
        ]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.version(), 2);
        assert!(registry.contains(&ReplicaId::new("Beta")));
    }

    #[test]
    fn test_new_node_txn() {
        let command = RegistryCommand::from_pool_txn(&new_node("Alpha", 9701))
            .unwrap()
            .unwrap();
        match command {
            RegistryCommand::AddReplica { id, info } => {
                assert_eq!(id, ReplicaId::new("Alpha"));
                assert_eq!(info.client_address, HostAddress::new("10.0.0.1", 9702));
                assert_eq!(info.nym.as_deref(), Some("nym-Alpha"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_change_ha_applies_to_known_replica() {
        let mut registry = ReplicaRegistry::new();
        registry.apply(
            RegistryCommand::from_pool_txn(&new_node("Alpha", 9701))
                .unwrap()
                .unwrap(),
        );

        let change = txn(json!({
            "type": "CHANGE_HA",
            "dest": "nym-Alpha",
            "data": {
                "alias": "Alpha",
                "node_ip": "10.0.0.9",
                "node_port": 9801,
                "client_ip": "10.0.0.9",
                "client_port": 9802
            }
        }));
        let command = RegistryCommand::from_pool_txn(&change).unwrap().unwrap();
        assert!(registry.apply(command));
        assert_eq!(registry.version(), 2);
        assert_eq!(
            registry.get(&ReplicaId::new("Alpha")).unwrap().client_address,
            HostAddress::new("10.0.0.9", 9802)
        );
    }

    #[test]
    fn test_change_for_unknown_replica_ignored() {
        let mut registry = ReplicaRegistry::new();
        let applied = registry.apply(RegistryCommand::ChangeKeys {
            id: ReplicaId::new("Ghost"),
            verkey: "abc".to_string(),
        });
        assert!(!applied);
        assert_eq!(registry.version(), 0);
    }

    #[test]
    fn test_change_keys_txn() {
        let change = txn(json!({
            "type": "CHANGE_KEYS",
            "dest": "nym-Alpha",
            "data": {"alias": "Alpha", "verkey": "newkey"}
        }));
        let command = RegistryCommand::from_pool_txn(&change).unwrap().unwrap();
        assert_eq!(command.replica(), &ReplicaId::new("Alpha"));
    }

    #[test]
    fn test_non_membership_txn() {
        let nym = txn(json!({"type": "NYM", "dest": "abc"}));
        assert!(RegistryCommand::from_pool_txn(&nym).unwrap().is_none());
    }

    #[test]
    fn test_malformed_new_node() {
        let bad = txn(json!({"type": "NEW_NODE", "data": {"alias": "Alpha"}}));
        assert!(RegistryCommand::from_pool_txn(&bad).is_err());
    }
}
