//! Connection readiness gate
//!
//! Tracks which configured replicas are connected, the client's readiness
//! state, whether the pool ledger has been discovered, and the requests
//! waiting for both. The gate decides; the client performs the sends.
//!
//! # State machine
//!
//! ```text
//! NotStarted --start--> Starting --enough--> StartedHungry --all--> Started
//!                          ^                       |  ^                |
//!                          |                       +--+----------------+
//!                       (any going state) --stop--> Stopped
//! ```
//!
//! Requests are dispatched only when `connected >= f + 1` and the sync mode
//! is `Discovered`; otherwise they queue in submission order.

use crate::{
    fault::FaultParameters,
    registry::{RegistryCommand, ReplicaRegistry},
    types::{Identifier, ReplicaId, Request},
    Result,
};
use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};

/// Client lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReadinessState {
    /// Constructed, never started
    NotStarted,
    /// Started, no connection batch has made it ready yet
    Starting,
    /// At least `f + 1` replicas connected
    StartedHungry,
    /// Every configured replica connected
    Started,
    /// Stopped
    Stopped,
}

impl ReadinessState {
    /// Started and not stopped
    pub fn is_going(&self) -> bool {
        matches!(
            self,
            ReadinessState::Starting | ReadinessState::StartedHungry | ReadinessState::Started
        )
    }
}

/// Whether the client knows the current pool membership
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncMode {
    /// Not syncing
    Undetermined,
    /// Pool ledger catch-up in progress
    CatchingUp,
    /// Membership known
    Discovered,
}

/// Requests waiting for readiness, with the identity that signed them
pub type PendingRequestQueue = VecDeque<(Request, Identifier)>;

/// Outcome of a connection batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionUpdate {
    /// Configured replicas that joined in this batch
    pub joined: Vec<ReplicaId>,
    /// Requests released for dispatch, in submission order
    pub flushed: Vec<(Request, Identifier)>,
}

/// Readiness gate
#[derive(Debug, Clone)]
pub struct ConnectionGate {
    registry: ReplicaRegistry,
    connected: BTreeSet<ReplicaId>,
    status: ReadinessState,
    mode: SyncMode,
    fault: FaultParameters,
    pending: PendingRequestQueue,
}

impl ConnectionGate {
    /// Create gate over a registry
    pub fn new(registry: ReplicaRegistry, mode: SyncMode) -> Result<Self> {
        let fault = FaultParameters::derive(registry.len())?;
        Ok(Self {
            registry,
            connected: BTreeSet::new(),
            status: ReadinessState::NotStarted,
            mode,
            fault,
            pending: VecDeque::new(),
        })
    }

    /// Current replica registry
    pub fn registry(&self) -> &ReplicaRegistry {
        &self.registry
    }

    /// Current fault parameters
    pub fn fault(&self) -> &FaultParameters {
        &self.fault
    }

    /// Current readiness state
    pub fn status(&self) -> ReadinessState {
        self.status
    }

    /// Set readiness state (lifecycle transitions)
    pub fn set_status(&mut self, status: ReadinessState) {
        if self.status != status {
            tracing::debug!("Readiness {:?} -> {:?}", self.status, status);
            self.status = status;
        }
    }

    /// Current sync mode
    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    /// Set sync mode
    pub fn set_mode(&mut self, mode: SyncMode) {
        if self.mode != mode {
            tracing::debug!("Sync mode {:?} -> {:?}", self.mode, mode);
            self.mode = mode;
        }
    }

    /// Connected replicas that are still configured
    pub fn connected(&self) -> impl Iterator<Item = &ReplicaId> {
        self.connected
            .iter()
            .filter(move |id| self.registry.contains(id))
    }

    /// Number of connected configured replicas
    pub fn connected_count(&self) -> usize {
        self.connected().count()
    }

    /// Whether `f + 1` replicas are connected
    pub fn has_sufficient_connections(&self) -> bool {
        self.connected_count() >= self.fault.min_required_connections
    }

    /// Whether a request submitted now would be sent right away
    pub fn can_dispatch(&self) -> bool {
        self.mode == SyncMode::Discovered && self.has_sufficient_connections()
    }

    /// Queue a request until the client can dispatch
    pub fn enqueue(&mut self, request: Request, identifier: Identifier) {
        tracing::debug!("Enqueuing request {} until it can be sent", request.req_id);
        self.pending.push_back((request, identifier));
    }

    /// Put released requests that could not be sent back at the head of the
    /// queue, keeping their order
    pub fn requeue(&mut self, unsent: Vec<(Request, Identifier)>) {
        if unsent.is_empty() {
            return;
        }
        tracing::debug!("Requeuing {} unsent requests", unsent.len());
        for entry in unsent.into_iter().rev() {
            self.pending.push_front(entry);
        }
    }

    /// Waiting requests
    pub fn pending(&self) -> &PendingRequestQueue {
        &self.pending
    }

    /// Release every waiting request if the client can dispatch
    pub fn flush(&mut self) -> Vec<(Request, Identifier)> {
        if !self.can_dispatch() || self.pending.is_empty() {
            return Vec::new();
        }
        tracing::debug!("Flushing pending request queue of size {}", self.pending.len());
        self.pending.drain(..).collect()
    }

    /// Apply a batch of connection changes
    pub fn on_connections_changed(
        &mut self,
        joined: &BTreeSet<ReplicaId>,
        left: &BTreeSet<ReplicaId>,
    ) -> ConnectionUpdate {
        for id in left {
            self.connected.remove(id);
        }

        let mut update = ConnectionUpdate::default();
        for id in joined {
            if !self.registry.contains(id) {
                tracing::warn!("Connection from unconfigured replica {} ignored", id);
                continue;
            }
            if self.connected.insert(id.clone()) {
                update.joined.push(id.clone());
            }
        }

        if self.status.is_going() {
            let connected = self.connected_count();
            if connected == self.fault.total_replicas {
                self.set_status(ReadinessState::Started);
            } else if connected >= self.fault.min_required_connections {
                self.set_status(ReadinessState::StartedHungry);
            }
            update.flushed = self.flush();
        }

        update
    }

    /// Forget every connection (transport closed)
    pub fn disconnect_all(&mut self) {
        self.connected.clear();
    }

    /// Apply a membership change; returns whether anything changed
    pub fn apply(&mut self, command: RegistryCommand) -> Result<bool> {
        if !self.registry.apply(command) {
            return Ok(false);
        }
        self.fault = FaultParameters::derive(self.registry.len())?;
        tracing::info!(
            "Registry version {}: {} replicas, f = {}",
            self.registry.version(),
            self.fault.total_replicas,
            self.fault.f
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HostAddress, RequestId};
    use serde_json::json;

    fn registry(n: usize) -> ReplicaRegistry {
        ReplicaRegistry::from_addresses(
            (0..n).map(|i| (ReplicaId::new(format!("N{}", i)), HostAddress::new("127.0.0.1", 9700 + i as u16))),
        )
    }

    fn set(names: &[&str]) -> BTreeSet<ReplicaId> {
        names.iter().map(|n| ReplicaId::new(*n)).collect()
    }

    fn request(n: u64) -> (Request, Identifier) {
        (
            Request::new(Identifier::new("c"), RequestId(n), json!({})),
            Identifier::new("c"),
        )
    }

    #[test]
    fn test_empty_registry_rejected() {
        assert!(ConnectionGate::new(ReplicaRegistry::new(), SyncMode::Discovered).is_err());
    }

    #[test]
    fn test_state_progression() {
        let mut gate = ConnectionGate::new(registry(4), SyncMode::Discovered).unwrap();
        gate.set_status(ReadinessState::Starting);

        gate.on_connections_changed(&set(&["N0"]), &set(&[]));
        assert_eq!(gate.status(), ReadinessState::Starting);
        assert!(!gate.has_sufficient_connections());

        gate.on_connections_changed(&set(&["N1"]), &set(&[]));
        assert_eq!(gate.status(), ReadinessState::StartedHungry);

        gate.on_connections_changed(&set(&["N2", "N3"]), &set(&[]));
        assert_eq!(gate.status(), ReadinessState::Started);

        // Losing replicas does not demote the state
        gate.on_connections_changed(&set(&[]), &set(&["N2", "N3", "N1"]));
        assert_eq!(gate.status(), ReadinessState::Started);
        assert!(!gate.has_sufficient_connections());
    }

    #[test]
    fn test_not_going_ignores_readiness() {
        let mut gate = ConnectionGate::new(registry(4), SyncMode::Discovered).unwrap();
        let (req, id) = request(1);
        gate.enqueue(req, id);
        let update = gate.on_connections_changed(&set(&["N0", "N1"]), &set(&[]));
        assert_eq!(gate.status(), ReadinessState::NotStarted);
        assert!(update.flushed.is_empty());
        assert_eq!(update.joined.len(), 2);
    }

    #[test]
    fn test_flush_in_submission_order() {
        let mut gate = ConnectionGate::new(registry(4), SyncMode::Discovered).unwrap();
        gate.set_status(ReadinessState::Starting);
        for n in 1..=3 {
            let (req, id) = request(n);
            gate.enqueue(req, id);
        }

        let update = gate.on_connections_changed(&set(&["N0", "N3"]), &set(&[]));
        let order: Vec<u64> = update.flushed.iter().map(|(r, _)| r.req_id.0).collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert!(gate.pending().is_empty());
    }

    #[test]
    fn test_requeue_goes_ahead_of_later_requests() {
        let mut gate = ConnectionGate::new(registry(4), SyncMode::Discovered).unwrap();
        gate.set_status(ReadinessState::Starting);
        for n in 1..=3 {
            let (req, id) = request(n);
            gate.enqueue(req, id);
        }
        let mut released = gate.on_connections_changed(&set(&["N0", "N1"]), &set(&[])).flushed;
        assert_eq!(released.len(), 3);

        let (req, id) = request(4);
        gate.enqueue(req, id);
        let unsent = released.split_off(1);
        gate.requeue(unsent);

        let order: Vec<u64> = gate.flush().iter().map(|(r, _)| r.req_id.0).collect();
        assert_eq!(order, vec![2, 3, 4]);
    }

    #[test]
    fn test_no_flush_until_discovered() {
        let mut gate = ConnectionGate::new(registry(4), SyncMode::CatchingUp).unwrap();
        gate.set_status(ReadinessState::Starting);
        let (req, id) = request(1);
        gate.enqueue(req, id);

        let update = gate.on_connections_changed(&set(&["N0", "N1"]), &set(&[]));
        assert!(update.flushed.is_empty());

        gate.set_mode(SyncMode::Discovered);
        assert_eq!(gate.flush().len(), 1);
    }

    #[test]
    fn test_unconfigured_replicas_do_not_count() {
        let mut gate = ConnectionGate::new(registry(4), SyncMode::Discovered).unwrap();
        gate.set_status(ReadinessState::Starting);
        let update = gate.on_connections_changed(&set(&["N0", "Stranger"]), &set(&[]));
        assert_eq!(update.joined, vec![ReplicaId::new("N0")]);
        assert_eq!(gate.connected_count(), 1);
    }

    #[test]
    fn test_registry_growth_recomputes_fault() {
        let mut gate = ConnectionGate::new(registry(4), SyncMode::Discovered).unwrap();
        assert_eq!(gate.fault().f, 1);
        for i in 4..7 {
            let changed = gate
                .apply(RegistryCommand::AddReplica {
                    id: ReplicaId::new(format!("N{}", i)),
                    info: crate::registry::ReplicaInfo::with_client_address(HostAddress::new(
                        "127.0.0.1",
                        9800 + i as u16,
                    )),
                })
                .unwrap();
            assert!(changed);
        }
        assert_eq!(gate.fault().f, 2);
        assert_eq!(gate.fault().min_required_connections, 3);
    }
}
