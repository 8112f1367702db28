//! Administrative operations
//!
//! Each helper builds one pool operation and submits it with the default
//! identity.

use crate::{
    client::Client,
    registry::{CHANGE_HA, CHANGE_KEYS, NEW_NODE, NYM},
    transport::Transport,
    types::{HostAddress, Request, Role},
    wallet::hex_to_cryptonym,
    Error, Result,
};
use serde_json::{json, Value};

fn addresses(name: &str, node: &HostAddress, client: &HostAddress) -> Value {
    json!({
        "node_ip": node.host,
        "node_port": node.port,
        "client_ip": client.host,
        "client_port": client.port,
        "alias": name,
    })
}

impl<T: Transport> Client<T> {
    fn submit_one(&mut self, operation: Value) -> Result<Request> {
        self.submit(vec![operation], None)?
            .pop()
            .ok_or_else(|| Error::InvalidArgument("No request created".to_string()))
    }

    /// Register a new identity with a role
    pub fn submit_new_client(
        &mut self,
        role: Role,
        name: &str,
        verkey_hex: &str,
    ) -> Result<Request> {
        let nym = hex_to_cryptonym(verkey_hex)?;
        self.submit_one(json!({
            "type": NYM,
            "role": role.code(),
            "dest": nym,
            "alias": name,
        }))
    }

    /// Register a new steward
    pub fn submit_new_steward(&mut self, name: &str, verkey_hex: &str) -> Result<Request> {
        self.submit_new_client(Role::Steward, name, verkey_hex)
    }

    /// Add a node to the pool
    pub fn submit_new_node(
        &mut self,
        name: &str,
        verkey_hex: &str,
        node_address: &HostAddress,
        client_address: &HostAddress,
    ) -> Result<Request> {
        let nym = hex_to_cryptonym(verkey_hex)?;
        self.submit_one(json!({
            "type": NEW_NODE,
            "dest": nym,
            "data": addresses(name, node_address, client_address),
        }))
    }

    /// Move a node to new addresses
    pub fn submit_node_address_change(
        &mut self,
        name: &str,
        nym: &str,
        node_address: &HostAddress,
        client_address: &HostAddress,
    ) -> Result<Request> {
        self.submit_one(json!({
            "type": CHANGE_HA,
            "dest": nym,
            "data": addresses(name, node_address, client_address),
        }))
    }

    /// Rotate a node's verification key
    pub fn submit_node_keys_change(
        &mut self,
        name: &str,
        nym: &str,
        verkey: &str,
    ) -> Result<Request> {
        self.submit_one(json!({
            "type": CHANGE_KEYS,
            "dest": nym,
            "data": {
                "verkey": verkey,
                "alias": name,
            },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::ClientBuilder,
        registry::{RegistryCommand, ReplicaRegistry},
        transport::MemoryTransport,
        types::ReplicaId,
    };

    fn client() -> Client<MemoryTransport> {
        ClientBuilder::new("steward1", MemoryTransport::new())
            .registry(ReplicaRegistry::from_addresses(vec![(
                ReplicaId::new("Alpha"),
                HostAddress::new("127.0.0.1", 9702),
            )]))
            .build()
            .unwrap()
    }

    #[test]
    fn test_new_steward_operation() {
        let mut client = client();
        let verkey = hex::encode([3u8; 32]);
        let request = client.submit_new_steward("bob", &verkey).unwrap();

        assert_eq!(request.operation["type"], "NYM");
        assert_eq!(request.operation["role"], "STEWARD");
        assert_eq!(request.operation["alias"], "bob");
        assert_eq!(
            request.operation["dest"],
            bs58::encode([3u8; 32]).into_string()
        );
        assert!(request.is_signed());
    }

    #[test]
    fn test_new_node_operation_is_a_registry_command() {
        let mut client = client();
        let request = client
            .submit_new_node(
                "Epsilon",
                &hex::encode([9u8; 32]),
                &HostAddress::new("10.0.0.5", 9709),
                &HostAddress::new("10.0.0.5", 9710),
            )
            .unwrap();

        let txn = request.operation.as_object().unwrap();
        match RegistryCommand::from_pool_txn(txn).unwrap() {
            Some(RegistryCommand::AddReplica { id, info }) => {
                assert_eq!(id, ReplicaId::new("Epsilon"));
                assert_eq!(info.client_address, HostAddress::new("10.0.0.5", 9710));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_keys_change_operation() {
        let mut client = client();
        let request = client
            .submit_node_keys_change("Alpha", "nym-Alpha", "newverkey")
            .unwrap();
        assert_eq!(request.operation["type"], "CHANGE_KEYS");
        assert_eq!(request.operation["data"]["verkey"], "newverkey");
    }

    #[test]
    fn test_bad_hex_verkey() {
        let mut client = client();
        assert!(matches!(
            client.submit_new_client(Role::User, "eve", "not-hex"),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(client.last_req_id().0, 0);
    }
}
