//! Simulated pool binary
//!
//! Runs a client against an in-process pool over `MemoryTransport`. Every
//! replica keeps its own Merkle tree of executed requests and answers with
//! proofs; the last replica of a pool of four or more is Byzantine and forges
//! its results.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use pool_client::{
    transport::SentMessage, Client, ClientBuilder, ClientConfig, ClientMessage, MemoryTransport,
    ReplicaId, RequestId, Role, StatusQuorumManager,
};
use pool_ledger::{
    crypto::KeyPair,
    types::{LedgerStatus, Txn},
    CompactSerializer, MerkleTree, PoolLedger,
};
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tracing::{error, info, warn};

const REQUESTS: usize = 5;
const MAX_TICKS: usize = 200;

/// One simulated replica
struct SimReplica {
    id: ReplicaId,
    byzantine: bool,
    tree: MerkleTree,
    serializer: CompactSerializer,
}

impl SimReplica {
    fn new(id: ReplicaId, byzantine: bool) -> Self {
        Self {
            id,
            byzantine,
            tree: MerkleTree::new(),
            serializer: CompactSerializer::default(),
        }
    }

    /// Execute a request and build the reply result with its proof
    fn execute(&mut self, request: &Value) -> Value {
        let mut txn = request
            .get("operation")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        txn.insert("identifier".into(), request["identifier"].clone());
        txn.insert("reqId".into(), request["reqId"].clone());

        let seq_no = self.tree.append(&self.serializer.serialize(&txn));
        let size = seq_no as usize;
        let audit_path: Vec<Value> = self
            .tree
            .audit_path(size - 1, size)
            .unwrap_or_default()
            .iter()
            .map(|hash| Value::from(STANDARD.encode(hash)))
            .collect();

        let mut result = txn;
        if self.byzantine {
            result.insert("dest".into(), json!("forged"));
        }
        result.insert("seqNo".into(), json!(seq_no));
        result.insert("rootHash".into(), json!(self.tree.root().to_base64()));
        result.insert("auditPath".into(), Value::Array(audit_path));
        Value::Object(result)
    }
}

/// In-process pool answering whatever the client sends
struct SimulatedPool {
    replicas: Vec<SimReplica>,
    status: Option<LedgerStatus>,
}

impl SimulatedPool {
    fn new(ids: Vec<ReplicaId>, status: Option<LedgerStatus>) -> Self {
        let byzantine = if ids.len() >= 4 { ids.last().cloned() } else { None };
        let replicas = ids
            .into_iter()
            .map(|id| {
                let is_byzantine = Some(&id) == byzantine.as_ref();
                if is_byzantine {
                    warn!("Replica {} is Byzantine", id);
                }
                SimReplica::new(id, is_byzantine)
            })
            .collect();
        Self { replicas, status }
    }

    fn ids(&self) -> Vec<ReplicaId> {
        self.replicas.iter().map(|r| r.id.clone()).collect()
    }

    /// Answer everything the client sent since the last call
    fn pump(&mut self, transport: &MemoryTransport) -> Result<usize> {
        let mut answered = 0;
        for SentMessage { message, targets } in transport.take_sent() {
            let op = message.get("op").and_then(Value::as_str).map(str::to_string);
            for replica in self
                .replicas
                .iter_mut()
                .filter(|r| targets.is_empty() || targets.contains(&r.id))
            {
                match op.as_deref() {
                    Some("LEDGER_STATUS") => {
                        if let Some(status) = &self.status {
                            let reply = ClientMessage::LedgerStatus(status.clone()).to_value()?;
                            transport.deliver(replica.id.clone(), reply);
                        }
                    }
                    _ if message.get("reqId").is_some() => {
                        let result = replica.execute(&message);
                        transport.deliver(replica.id.clone(), json!({"op": "REPLY", "result": result}));
                    }
                    _ => continue,
                }
                answered += 1;
            }
        }
        Ok(answered)
    }
}

fn genesis_txns() -> Vec<Txn> {
    ["Alpha", "Beta", "Gamma", "Delta"]
        .iter()
        .enumerate()
        .filter_map(|(i, alias)| {
            let keys = KeyPair::from_seed(&[i as u8 + 1; 32]);
            let port = 9701 + 2 * i as u16;
            json!({
                "type": "NEW_NODE",
                "dest": keys.verkey(),
                "data": {
                    "alias": alias,
                    "node_ip": "127.0.0.1",
                    "node_port": port,
                    "client_ip": "127.0.0.1",
                    "client_port": port + 1
                }
            })
            .as_object()
            .cloned()
        })
        .collect()
}

fn build_client(config: &ClientConfig, transport: MemoryTransport) -> Result<Client<MemoryTransport>> {
    if config.static_registry().is_some() || config.pool_genesis_file.is_some() {
        return Ok(ClientBuilder::from_config(config, transport)?.build()?);
    }

    info!("No pool configured, using built-in genesis");
    let ledger = PoolLedger::from_genesis(genesis_txns())?;
    // f = 1 for the built-in four node pool
    let manager = StatusQuorumManager::new(2, ledger.status());
    Ok(ClientBuilder::new(config.name.clone(), transport)
        .last_req_id(config.last_req_id)
        .pool_ledger(ledger, Box::new(manager))
        .build()?)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting simulated pool");

    // Load configuration
    let config = if let Ok(config_path) = std::env::var("POOL_CLIENT_CONFIG") {
        info!("Loading config from: {}", config_path);
        ClientConfig::from_file(&config_path)?
    } else {
        info!("Loading config from environment variables");
        ClientConfig::from_env()?
    };

    let transport = MemoryTransport::new();
    let mut client = build_client(&config, transport.clone()).context("building client")?;
    let ids: Vec<ReplicaId> = client.registry().ids().cloned().collect();
    let mut pool = SimulatedPool::new(ids, client.pool_ledger().map(PoolLedger::status));

    client.start()?;
    let requests = (0..REQUESTS)
        .map(|i| {
            let verkey = hex::encode(KeyPair::from_seed(&[100 + i as u8; 32]).public_key());
            client.submit_new_client(Role::User, &format!("user{}", i), &verkey)
        })
        .collect::<pool_client::Result<Vec<_>>>()?;
    info!("Submitted {} requests, {} queued", requests.len(), client.pending_requests().count());

    let shared = client.into_shared();
    transport.change_connections(pool.ids(), Vec::new());

    // Service loop
    let limit = config.service.limit;
    let interval = Duration::from_millis(config.service.interval_ms);
    let service_client = Arc::clone(&shared);
    let service_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = service_client.lock().service(limit) {
                error!("Service error: {}", e);
            }
        }
    });

    let req_ids: Vec<RequestId> = requests.iter().map(|r| r.req_id).collect();
    let mut ticker = tokio::time::interval(interval);
    let mut done = false;
    for _ in 0..MAX_TICKS {
        ticker.tick().await;
        pool.pump(&transport)?;
        let client = shared.lock();
        done = req_ids
            .iter()
            .all(|id| client.resolve(*id).confirmed().is_some());
        if done {
            break;
        }
    }
    service_task.abort();

    let mut client = shared.lock();
    if !done {
        warn!("Not every request was confirmed");
    }
    for req_id in &req_ids {
        let (_, status) = client.reply(*req_id);
        info!("Request {}: {}", req_id, status);

        for (replica, reply) in client.reply_details(*req_id) {
            match client.verify_merkle_proof(std::slice::from_ref(&reply)) {
                Ok(()) => info!("Proof from {} verified", replica),
                Err(e) => warn!("Proof from {} rejected: {}", replica, e),
            }
        }
    }

    info!("Metrics:\n{}", client.metrics().gather());
    client.stop();
    Ok(())
}
