//! The pool client
//!
//! [`Client`] ties the pieces together: it signs and submits requests through
//! the readiness gate, records replica messages in the inbox, routes
//! pool-protocol messages to catch-up, and resolves replies into quorum
//! outcomes. Everything runs on the caller's task; [`SharedClient`] wraps a
//! client for callers that need to share it.

use crate::{
    catchup::{CatchupCoordinator, LedgerManager, LedgerManagerEvent, StatusQuorumManager},
    config::ClientConfig,
    fault::FaultParameters,
    inbox::Inbox,
    message::{ClientMessage, MessageKind, NodeMessage, Reply},
    metrics::Metrics,
    proof,
    quorum::{self, ConsensusOutcome, ReplyStatus},
    readiness::{ConnectionGate, ReadinessState, SyncMode},
    registry::{RegistryCommand, ReplicaRegistry},
    transport::{Transport, TransportEvent},
    types::{Identifier, ReplicaId, Request, RequestId},
    wallet::{SimpleSigner, Signer, Wallet},
    Error, Result,
};
use parking_lot::Mutex;
use pool_ledger::{PoolLedger, POOL_LEDGER_ID};
use serde_json::Value;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

/// Client shared between tasks
pub type SharedClient<T> = Arc<Mutex<Client<T>>>;

/// Builder for [`Client`]
#[derive(Debug)]
pub struct ClientBuilder<T: Transport> {
    name: String,
    transport: T,
    registry: Option<ReplicaRegistry>,
    pool: Option<(PoolLedger, Box<dyn LedgerManager>)>,
    last_req_id: u64,
    signer: Option<Arc<dyn Signer>>,
    signers: Vec<Arc<dyn Signer>>,
    wallet: Option<Wallet>,
}

impl<T: Transport> ClientBuilder<T> {
    /// Start building a client
    pub fn new(name: impl Into<String>, transport: T) -> Self {
        Self {
            name: name.into(),
            transport,
            registry: None,
            pool: None,
            last_req_id: 0,
            signer: None,
            signers: Vec::new(),
            wallet: None,
        }
    }

    /// Builder configured from a [`ClientConfig`]
    ///
    /// A static replica list wins; otherwise the pool genesis file is loaded
    /// and catch-up completes once `f + 1` replicas confirm its position.
    pub fn from_config(config: &ClientConfig, transport: T) -> Result<Self> {
        let builder = Self::new(config.name.clone(), transport).last_req_id(config.last_req_id);

        if let Some(registry) = config.static_registry() {
            return Ok(builder.registry(registry));
        }

        let genesis = config.pool_genesis_file.as_ref().ok_or_else(|| {
            Error::Config("Neither replicas nor pool genesis file configured".to_string())
        })?;
        let ledger = PoolLedger::from_genesis(PoolLedger::load_genesis_file(genesis)?)?;
        let registry = registry_from_ledger(&ledger)?;
        let fault = FaultParameters::derive(registry.len())?;
        let manager = StatusQuorumManager::new(fault.quorum(), ledger.status());
        Ok(builder.pool_ledger(ledger, Box::new(manager)))
    }

    /// Use a static replica registry
    pub fn registry(mut self, registry: ReplicaRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Discover the registry from a pool ledger kept in sync by `manager`
    pub fn pool_ledger(mut self, ledger: PoolLedger, manager: Box<dyn LedgerManager>) -> Self {
        self.pool = Some((ledger, manager));
        self
    }

    /// Resume request numbering after `last_req_id`
    pub fn last_req_id(mut self, last_req_id: u64) -> Self {
        self.last_req_id = last_req_id;
        self
    }

    /// Sign with a single signer, which becomes the default identity
    pub fn signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Sign with several signers
    pub fn signers(mut self, signers: impl IntoIterator<Item = Arc<dyn Signer>>) -> Self {
        self.signers.extend(signers);
        self
    }

    /// Use an existing wallet
    pub fn wallet(mut self, wallet: Wallet) -> Self {
        self.wallet = Some(wallet);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<Client<T>> {
        if self.signer.is_some() && !self.signers.is_empty() {
            return Err(Error::AmbiguousSigner);
        }

        let (registry, mode, catchup) = match (self.registry, self.pool) {
            (Some(_), Some(_)) => {
                return Err(Error::Config(
                    "A static registry and a pool ledger are mutually exclusive".to_string(),
                ))
            }
            (Some(registry), None) => (registry, SyncMode::Discovered, None),
            (None, Some((ledger, manager))) => {
                let registry = registry_from_ledger(&ledger)?;
                let coordinator = CatchupCoordinator::new(manager, ledger);
                (registry, SyncMode::Undetermined, Some(coordinator))
            }
            (None, None) => {
                return Err(Error::Config(
                    "A replica registry or a pool ledger is required".to_string(),
                ))
            }
        };

        let wallet = setup_wallet(&self.name, self.wallet, self.signer, self.signers);
        let gate = ConnectionGate::new(registry, mode)?;

        tracing::info!(
            "Client {} initialized with the following replica registry:",
            self.name
        );
        for (id, info) in gate.registry().iter() {
            tracing::info!(
                "    {} listens at {} on port {}",
                id,
                info.client_address.host,
                info.client_address.port
            );
        }

        let mut transport = self.transport;
        transport.registry_changed(gate.registry());

        Ok(Client {
            name: self.name,
            transport,
            gate,
            inbox: Inbox::new(),
            wallet,
            last_req_id: RequestId(self.last_req_id),
            catchup,
            metrics: Metrics::new()?,
        })
    }
}

fn registry_from_ledger(ledger: &PoolLedger) -> Result<ReplicaRegistry> {
    let mut registry = ReplicaRegistry::new();
    for txn in ledger.iter() {
        if let Some(command) = RegistryCommand::from_pool_txn(txn)? {
            registry.apply(command);
        }
    }
    Ok(registry)
}

fn setup_wallet(
    name: &str,
    wallet: Option<Wallet>,
    signer: Option<Arc<dyn Signer>>,
    signers: Vec<Arc<dyn Signer>>,
) -> Wallet {
    let mut wallet = wallet.unwrap_or_else(|| Wallet::new(name));

    if !wallet.is_empty() {
        if wallet.default_identifier().is_none() && wallet.len() == 1 {
            let only = wallet.identifiers().next().cloned();
            if let Some(only) = only {
                wallet.set_default_identifier(only);
            }
        }
        return wallet;
    }

    if let Some(signer) = signer {
        wallet.set_default_identifier(signer.identifier().clone());
        wallet.add_signer(signer);
    } else if !signers.is_empty() {
        for signer in signers {
            wallet.add_signer(signer);
        }
    } else {
        let signer = SimpleSigner::new(name);
        wallet.set_default_identifier(Identifier::new(name));
        wallet.add_signer(Arc::new(signer));
    }
    wallet
}

/// Client of a BFT replica pool
#[derive(Debug)]
pub struct Client<T: Transport> {
    name: String,
    transport: T,
    gate: ConnectionGate,
    inbox: Inbox,
    wallet: Wallet,
    last_req_id: RequestId,
    catchup: Option<CatchupCoordinator>,
    metrics: Metrics,
}

impl<T: Transport> Client<T> {
    /// Client name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Readiness state
    pub fn status(&self) -> ReadinessState {
        self.gate.status()
    }

    /// Sync mode
    pub fn mode(&self) -> SyncMode {
        self.gate.mode()
    }

    /// Fault parameters of the current registry
    pub fn fault(&self) -> &FaultParameters {
        self.gate.fault()
    }

    /// Current replica registry
    pub fn registry(&self) -> &ReplicaRegistry {
        self.gate.registry()
    }

    /// Whether `f + 1` replicas are connected
    pub fn has_sufficient_connections(&self) -> bool {
        self.gate.has_sufficient_connections()
    }

    /// Received messages
    pub fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    /// Requests waiting for readiness
    pub fn pending_requests(&self) -> impl Iterator<Item = &Request> {
        self.gate.pending().iter().map(|(request, _)| request)
    }

    /// Signers
    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    /// Signers, mutably
    pub fn wallet_mut(&mut self) -> &mut Wallet {
        &mut self.wallet
    }

    /// Request id of the last created request
    pub fn last_req_id(&self) -> RequestId {
        self.last_req_id
    }

    /// Client's pool ledger view, if the registry is discovered from one
    pub fn pool_ledger(&self) -> Option<&PoolLedger> {
        self.catchup.as_ref().map(CatchupCoordinator::ledger)
    }

    /// Metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Wrap for sharing between tasks
    pub fn into_shared(self) -> SharedClient<T> {
        Arc::new(Mutex::new(self))
    }

    /// Start the transport and, with a pool ledger, catch-up
    pub fn start(&mut self) -> Result<()> {
        if self.gate.status().is_going() {
            tracing::info!(
                "Client {} is already {:?}, so start has no effect",
                self.name,
                self.gate.status()
            );
            return Ok(());
        }

        self.transport.start()?;
        self.gate.set_status(ReadinessState::Starting);
        if let Some(catchup) = self.catchup.as_mut() {
            catchup.start_sync();
            self.gate.set_mode(SyncMode::CatchingUp);
        }
        tracing::info!("Client {} started", self.name);
        Ok(())
    }

    /// Stop the transport
    pub fn stop(&mut self) {
        self.transport.stop();
        self.gate.disconnect_all();
        self.metrics.connected_replicas.set(0);
        self.gate.set_status(ReadinessState::Stopped);
        if let Some(catchup) = self.catchup.as_mut() {
            catchup.stop_sync();
            self.gate.set_mode(SyncMode::Undetermined);
        }
        tracing::info!("Client {} stopped", self.name);
    }

    /// Service the transport and the ledger manager once
    ///
    /// Returns the number of events handled. A failing event is logged and
    /// does not stop the batch; requests that could not be sent stay queued
    /// and are retried at the end of every call.
    pub fn service(&mut self, limit: usize) -> Result<usize> {
        let events = self.transport.service(limit);
        let mut count = events.len();

        for event in events {
            match event {
                TransportEvent::Message { message, from } => {
                    if let Err(e) = self.handle_node_message(message, from.clone()) {
                        tracing::warn!("Dropped message from {}: {}", from, e);
                    }
                }
                TransportEvent::ConnectionsChanged { joined, left } => {
                    if let Err(e) = self.on_connections_changed(&joined, &left) {
                        tracing::warn!("Client {} connection change incomplete: {}", self.name, e);
                    }
                }
            }
        }

        if let Some(catchup) = self.catchup.as_mut() {
            count += catchup.service_actions();
            let ledger_events = catchup.take_events();
            for event in ledger_events {
                if let Err(e) = self.on_ledger_event(event) {
                    tracing::warn!("Client {} ledger event failed: {}", self.name, e);
                }
            }
        }

        if !self.gate.pending().is_empty() {
            if let Err(e) = self.flush() {
                tracing::warn!("Client {} could not flush queued requests: {}", self.name, e);
            }
        }

        Ok(count)
    }

    /// Create the next request for an operation
    pub fn create_request(
        &mut self,
        operation: Value,
        identifier: Option<&Identifier>,
    ) -> Result<Request> {
        let identifier = identifier
            .or(self.wallet.default_identifier())
            .cloned()
            .ok_or_else(|| Error::NoSuchIdentity("<no default identifier>".to_string()))?;
        self.last_req_id = self.last_req_id.next();
        Ok(Request::new(identifier, self.last_req_id, operation))
    }

    /// Sign a request unless it already carries a signature
    pub fn sign(&self, request: &mut Request, signer: Option<&dyn Signer>) -> Result<()> {
        if request.is_signed() {
            return Ok(());
        }
        match signer {
            Some(signer) => signer.sign_request(request),
            None => {
                tracing::warn!(
                    "Client {} signer not configured so not signing request {}",
                    self.name,
                    request.req_id
                );
                Ok(())
            }
        }
    }

    /// Sign and submit operations, sending now or queueing until ready
    pub fn submit(
        &mut self,
        operations: impl IntoIterator<Item = Value>,
        identifier: Option<&Identifier>,
    ) -> Result<Vec<Request>> {
        let signer = self.wallet.lookup_signer(identifier)?;
        let identifier = signer.identifier().clone();

        let mut requests = Vec::new();
        for operation in operations {
            let mut request = self.create_request(operation, Some(&identifier))?;
            self.sign(&mut request, Some(signer.as_ref()))?;
            self.metrics.requests_submitted.inc();

            let sent = self.gate.can_dispatch()
                && self.gate.pending().is_empty()
                && match self.dispatch(&request) {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(
                            "Client {} could not send request {}: {}",
                            self.name,
                            request.req_id,
                            e
                        );
                        false
                    }
                };
            if !sent {
                self.gate.enqueue(request.clone(), identifier.clone());
                self.metrics.requests_queued.inc();
            }
            requests.push(request);
        }
        Ok(requests)
    }

    /// Send a message through the transport; empty `targets` broadcasts
    pub fn send(&mut self, message: &ClientMessage, targets: &[ReplicaId]) -> Result<()> {
        self.transport.send(message, targets)
    }

    fn dispatch(&mut self, request: &Request) -> Result<()> {
        tracing::debug!("Client {} sending request {}", self.name, request.req_id);
        self.transport
            .send(&ClientMessage::Request(request.clone()), &[])
    }

    /// Send every queued request if the client can dispatch
    ///
    /// On a send failure the failed request and everything behind it go back
    /// to the head of the queue.
    pub fn flush(&mut self) -> Result<usize> {
        let flushed = self.gate.flush();
        self.dispatch_flushed(flushed)
    }

    fn dispatch_flushed(&mut self, flushed: Vec<(Request, Identifier)>) -> Result<usize> {
        let mut sent = 0;
        let mut remaining = flushed.into_iter();
        while let Some((request, identifier)) = remaining.next() {
            if let Err(e) = self.dispatch(&request) {
                let mut unsent = vec![(request, identifier)];
                unsent.extend(remaining);
                self.gate.requeue(unsent);
                return Err(e);
            }
            sent += 1;
            self.metrics.requests_flushed.inc();
        }
        Ok(sent)
    }

    /// Record one message from a replica
    pub fn handle_node_message(&mut self, message: Value, from: ReplicaId) -> Result<()> {
        let kind = MessageKind::of(&message);
        let print_on_cli = !kind.is_pool();
        tracing::debug!(
            cli = print_on_cli,
            "Client {} got message from replica {}: {}",
            self.name,
            from,
            message
        );

        let quorum = self.gate.fault().quorum();
        let catchup = match self.catchup.as_mut() {
            Some(catchup) if kind.is_pool() => catchup,
            _ => {
                if kind == MessageKind::Reply {
                    self.metrics.replies_received.inc();
                }
                self.inbox.push(message, from);
                return Ok(());
            }
        };

        let decoded = match NodeMessage::decode(message) {
            Ok(decoded) => decoded,
            Err(e) => {
                self.metrics.messages_dropped.inc();
                return Err(e);
            }
        };

        let commands = match decoded {
            NodeMessage::PoolLedgerTxns(txns) => match catchup.pool_txn(txns, &from, quorum) {
                Ok(commands) => commands,
                Err(e) => {
                    self.metrics.messages_dropped.inc();
                    return Err(e);
                }
            },
            NodeMessage::LedgerStatus(status) => {
                catchup.ledger_status(status, &from);
                Vec::new()
            }
            NodeMessage::ConsistencyProof(proof) => {
                catchup.consistency_proof(proof, &from);
                Vec::new()
            }
            NodeMessage::CatchupRep(reply) => {
                catchup.catchup_reply(reply, &from);
                Vec::new()
            }
            NodeMessage::Reply(_) | NodeMessage::Other(_) => Vec::new(),
        };

        for command in commands {
            self.apply_registry_command(command)?;
        }
        Ok(())
    }

    /// Apply a batch of connection changes
    ///
    /// Ledger statuses still go to every joined replica when releasing the
    /// queue fails part way; the first error is returned afterwards.
    pub fn on_connections_changed(
        &mut self,
        joined: &BTreeSet<ReplicaId>,
        left: &BTreeSet<ReplicaId>,
    ) -> Result<()> {
        let update = self.gate.on_connections_changed(joined, left);
        self.metrics
            .connected_replicas
            .set(self.gate.connected_count() as i64);

        let mut first_error = self.dispatch_flushed(update.flushed).err();

        if self.catchup.is_some() {
            for replica in &update.joined {
                if let Err(e) = self.send_ledger_status(replica) {
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Announce the client's pool ledger position to one replica
    pub fn send_ledger_status(&mut self, replica: &ReplicaId) -> Result<()> {
        let status = match self.catchup.as_ref() {
            Some(catchup) => catchup.status(),
            None => return Ok(()),
        };
        self.transport
            .send(&ClientMessage::LedgerStatus(status), std::slice::from_ref(replica))
    }

    fn on_ledger_event(&mut self, event: LedgerManagerEvent) -> Result<()> {
        match event {
            LedgerManagerEvent::CatchupComplete { ledger_id } => {
                if ledger_id != POOL_LEDGER_ID {
                    tracing::error!("Client {} got unknown ledger {}", self.name, ledger_id);
                    return Ok(());
                }
                tracing::info!("Client {} discovered the pool", self.name);
                self.gate.set_mode(SyncMode::Discovered);
                self.flush()?;
            }
            LedgerManagerEvent::TxnApplied { ledger_id, txn } => {
                let quorum = self.gate.fault().quorum();
                let commands = match self.catchup.as_mut() {
                    Some(catchup) => catchup.txn_applied(ledger_id, txn, quorum)?,
                    None => Vec::new(),
                };
                for command in commands {
                    self.apply_registry_command(command)?;
                }
            }
        }
        Ok(())
    }

    fn apply_registry_command(&mut self, command: RegistryCommand) -> Result<()> {
        if self.gate.apply(command)? {
            self.transport.registry_changed(self.gate.registry());
        }
        Ok(())
    }

    /// Resolve the replies received for a request
    pub fn resolve(&self, req_id: RequestId) -> ConsensusOutcome {
        let outcome = quorum::resolve(&self.inbox, req_id, self.gate.fault());
        match &outcome {
            ConsensusOutcome::Confirmed(_) => self.metrics.confirmed.inc(),
            ConsensusOutcome::IndeterminateDisagreement => {
                self.metrics.disagreements.inc();
                tracing::error!(
                    "Received a different result from at least one of the replicas for request {}",
                    req_id
                );
            }
            _ => {}
        }
        outcome
    }

    /// Confirmed result (if any) and status of a request
    pub fn reply(&self, req_id: RequestId) -> (Option<Value>, ReplyStatus) {
        let outcome = self.resolve(req_id);
        let status = outcome.status();
        match outcome {
            ConsensusOutcome::Confirmed(result) => (Some(result), status),
            _ => (None, status),
        }
    }

    /// Latest reply from each replica for a request
    pub fn replies_from_all_replicas(&self, req_id: RequestId) -> BTreeMap<ReplicaId, Reply> {
        self.inbox
            .replies_for(req_id)
            .filter_map(|(from, result)| {
                result.as_object().map(|result| {
                    (
                        from.clone(),
                        Reply {
                            result: result.clone(),
                        },
                    )
                })
            })
            .collect()
    }

    /// Log and return what each replica replied for a request
    pub fn reply_details(&self, req_id: RequestId) -> BTreeMap<ReplicaId, Reply> {
        let replies = self.replies_from_all_replicas(req_id);
        if replies.is_empty() {
            tracing::info!("No replies received from replicas for request {}", req_id);
        }
        for (from, reply) in &replies {
            let result = Value::Object(reply.result.clone());
            tracing::info!("Replica {} replied with result {}", from, result);
        }
        replies
    }

    /// Verify the Merkle proofs of replies
    pub fn verify_merkle_proof(&self, replies: &[Reply]) -> Result<()> {
        let result = proof::verify_merkle_proof(replies);
        if let Err(Error::Proof { index, source }) = &result {
            self.metrics.proof_failures.inc();
            tracing::warn!("Proof of reply {} failed: {}", index, source);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{transport::MemoryTransport, types::HostAddress};
    use serde_json::json;

    fn registry(n: usize) -> ReplicaRegistry {
        ReplicaRegistry::from_addresses((0..n).map(|i| {
            (
                ReplicaId::new(format!("N{}", i)),
                HostAddress::new("127.0.0.1", 9700 + i as u16),
            )
        }))
    }

    fn ids(names: &[&str]) -> BTreeSet<ReplicaId> {
        names.iter().map(|n| ReplicaId::new(*n)).collect()
    }

    fn client() -> (Client<MemoryTransport>, MemoryTransport) {
        let handle = MemoryTransport::new();
        let client = ClientBuilder::new("alice", handle.clone())
            .registry(registry(4))
            .build()
            .unwrap();
        (client, handle)
    }

    #[test]
    fn test_default_signer_named_after_client() {
        let (client, _) = client();
        assert_eq!(
            client.wallet().default_identifier(),
            Some(&Identifier::new("alice"))
        );
        assert_eq!(client.fault().f, 1);
    }

    #[test]
    fn test_ambiguous_signer_rejected() {
        let result = ClientBuilder::new("c", MemoryTransport::new())
            .registry(registry(4))
            .signer(Arc::new(SimpleSigner::new("a")))
            .signers(vec![Arc::new(SimpleSigner::new("b")) as Arc<dyn Signer>])
            .build();
        assert!(matches!(result, Err(Error::AmbiguousSigner)));
    }

    #[test]
    fn test_signer_map_has_no_default() {
        let mut client = ClientBuilder::new("c", MemoryTransport::new())
            .registry(registry(4))
            .signers(vec![
                Arc::new(SimpleSigner::new("a")) as Arc<dyn Signer>,
                Arc::new(SimpleSigner::new("b")) as Arc<dyn Signer>,
            ])
            .build()
            .unwrap();
        assert!(matches!(
            client.submit(vec![json!({})], None),
            Err(Error::NoSuchIdentity(_))
        ));
        let requests = client
            .submit(vec![json!({})], Some(&Identifier::new("b")))
            .unwrap();
        assert_eq!(requests[0].identifier, Identifier::new("b"));
    }

    #[test]
    fn test_submit_unknown_identity() {
        let (mut client, _) = client();
        let result = client.submit(vec![json!({})], Some(&Identifier::new("mallory")));
        assert!(matches!(result, Err(Error::NoSuchIdentity(_))));
        assert_eq!(client.last_req_id(), RequestId(0));
    }

    #[test]
    fn test_queue_then_flush_on_connect() {
        let (mut client, handle) = client();
        client.start().unwrap();

        let requests = client
            .submit(vec![json!({"n": 1}), json!({"n": 2})], None)
            .unwrap();
        assert!(requests.iter().all(Request::is_signed));
        assert_eq!(client.pending_requests().count(), 2);
        assert_eq!(handle.sent_count(), 0);

        handle.change_connections(ids(&["N0", "N1"]), ids(&[]));
        client.service(10).unwrap();

        assert_eq!(client.status(), ReadinessState::StartedHungry);
        assert_eq!(client.pending_requests().count(), 0);
        let sent = handle.take_sent();
        let order: Vec<u64> = sent
            .iter()
            .map(|s| s.message["reqId"].as_u64().unwrap())
            .collect();
        assert_eq!(order, vec![1, 2]);

        // Ready now: sent immediately
        client.submit(vec![json!({"n": 3})], None).unwrap();
        assert_eq!(handle.sent_count(), 1);
    }

    #[test]
    fn test_failed_flush_keeps_requests_queued() {
        let (mut client, handle) = client();
        client.start().unwrap();
        client
            .submit(vec![json!({"n": 1}), json!({"n": 2}), json!({"n": 3})], None)
            .unwrap();

        // Release on connect and the retry at the end of the pass both fail
        handle.fail_sends(2);
        handle.change_connections(ids(&["N0", "N1"]), ids(&[]));
        assert!(client.service(10).is_ok());
        assert_eq!(handle.sent_count(), 0);

        client.submit(vec![json!({"n": 4})], None).unwrap();
        assert_eq!(handle.sent_count(), 0);
        let queued: Vec<u64> = client.pending_requests().map(|r| r.req_id.0).collect();
        assert_eq!(queued, vec![1, 2, 3, 4]);

        client.service(10).unwrap();
        let order: Vec<u64> = handle
            .take_sent()
            .iter()
            .map(|s| s.message["reqId"].as_u64().unwrap())
            .collect();
        assert_eq!(order, vec![1, 2, 3, 4]);
        assert_eq!(client.pending_requests().count(), 0);
    }

    #[test]
    fn test_flush_failure_requeues_whole_batch() {
        let (mut client, handle) = client();
        client.start().unwrap();
        handle.change_connections(ids(&["N0", "N1"]), ids(&[]));
        client.service(10).unwrap();

        handle.fail_sends(1);
        client.submit(vec![json!({"n": 1})], None).unwrap();
        client.submit(vec![json!({"n": 2}), json!({"n": 3})], None).unwrap();
        assert_eq!(client.pending_requests().count(), 3);

        // Failed send takes the rest of the batch back with it
        handle.fail_sends(1);
        assert!(client.flush().is_err());
        let queued: Vec<u64> = client.pending_requests().map(|r| r.req_id.0).collect();
        assert_eq!(queued, vec![1, 2, 3]);

        // Retried within the same service pass
        client.service(10).unwrap();
        let order: Vec<u64> = handle
            .take_sent()
            .iter()
            .map(|s| s.message["reqId"].as_u64().unwrap())
            .collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_submit_queues_on_send_failure() {
        let (mut client, handle) = client();
        client.start().unwrap();
        handle.change_connections(ids(&["N0", "N1"]), ids(&[]));
        client.service(10).unwrap();

        handle.fail_sends(1);
        client.submit(vec![json!({"n": 1})], None).unwrap();
        assert_eq!(client.pending_requests().count(), 1);

        // Queue is not empty so the next request waits behind it
        client.submit(vec![json!({"n": 2})], None).unwrap();
        assert_eq!(handle.sent_count(), 0);

        assert_eq!(client.flush().unwrap(), 2);
        let order: Vec<u64> = handle
            .take_sent()
            .iter()
            .map(|s| s.message["reqId"].as_u64().unwrap())
            .collect();
        assert_eq!(order, vec![1, 2]);
    }

    #[test]
    fn test_start_twice_has_no_effect() {
        let (mut client, _) = client();
        client.start().unwrap();
        client.start().unwrap();
        assert_eq!(client.status(), ReadinessState::Starting);
        client.stop();
        assert_eq!(client.status(), ReadinessState::Stopped);
        client.start().unwrap();
        assert_eq!(client.status(), ReadinessState::Starting);
    }

    #[test]
    fn test_resolve_through_inbox() {
        let (mut client, handle) = client();
        client.start().unwrap();
        let result = json!({"reqId": 1, "data": "ok"});
        handle.deliver("N0", json!({"op": "REPLY", "result": result}));
        client.service(10).unwrap();
        assert_eq!(client.reply(RequestId(1)).1, ReplyStatus::Unconfirmed);

        handle.deliver("N1", json!({"op": "REPLY", "result": result}));
        client.service(10).unwrap();
        assert_eq!(
            client.reply(RequestId(1)),
            (Some(result), ReplyStatus::Confirmed)
        );
        assert_eq!(client.replies_from_all_replicas(RequestId(1)).len(), 2);
        assert_eq!(client.reply(RequestId(2)).1, ReplyStatus::NotFound);
    }

    #[test]
    fn test_last_req_id_resumes() {
        let mut client = ClientBuilder::new("c", MemoryTransport::new())
            .registry(registry(4))
            .last_req_id(41)
            .build()
            .unwrap();
        let requests = client.submit(vec![json!({}), json!({})], None).unwrap();
        assert_eq!(requests[0].req_id, RequestId(42));
        assert_eq!(requests[1].req_id, RequestId(43));
    }

    #[test]
    fn test_missing_registry_rejected() {
        let result = ClientBuilder::new("c", MemoryTransport::new()).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
