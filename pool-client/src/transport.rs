//! Transport seam ("the stack")
//!
//! The client never touches sockets. A [`Transport`] delivers decoded replica
//! messages and connection changes as events from [`Transport::service`] and
//! accepts outbound messages through [`Transport::send`].

use crate::{
    message::ClientMessage,
    registry::ReplicaRegistry,
    types::ReplicaId,
    Error, Result,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::{
    collections::{BTreeSet, VecDeque},
    sync::Arc,
};

/// Event produced by servicing the transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Message received from a replica
    Message {
        /// Decoded JSON message
        message: Value,
        /// Sending replica
        from: ReplicaId,
    },

    /// Batch of connection changes
    ConnectionsChanged {
        /// Replicas newly connected
        joined: BTreeSet<ReplicaId>,
        /// Replicas disconnected
        left: BTreeSet<ReplicaId>,
    },
}

/// Connection layer to the replicas
pub trait Transport: Send {
    /// Open the stack
    fn start(&mut self) -> Result<()>;

    /// Close the stack
    fn stop(&mut self);

    /// Send a message; empty `targets` means every connected replica
    fn send(&mut self, message: &ClientMessage, targets: &[ReplicaId]) -> Result<()>;

    /// Collect up to `limit` pending events
    fn service(&mut self, limit: usize) -> Vec<TransportEvent>;

    /// Membership changed; reconnect as needed
    fn registry_changed(&mut self, _registry: &ReplicaRegistry) {}
}

/// Message handed to [`MemoryTransport::send`]
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    /// Wire form
    pub message: Value,
    /// Replicas addressed; empty for broadcast
    pub targets: Vec<ReplicaId>,
}

#[derive(Debug, Default)]
struct MemoryState {
    started: bool,
    inbound: VecDeque<TransportEvent>,
    sent: Vec<SentMessage>,
    failing_sends: usize,
    registry_version: u64,
}

/// In-process transport
///
/// Clones share one state, so a test or simulator can hold a handle, inject
/// events and inspect what the client sent.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    /// Create new in-memory transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message from a replica
    pub fn deliver(&self, from: impl Into<ReplicaId>, message: Value) {
        self.state.lock().inbound.push_back(TransportEvent::Message {
            message,
            from: from.into(),
        });
    }

    /// Queue a connection change
    pub fn change_connections(
        &self,
        joined: impl IntoIterator<Item = ReplicaId>,
        left: impl IntoIterator<Item = ReplicaId>,
    ) {
        self.state
            .lock()
            .inbound
            .push_back(TransportEvent::ConnectionsChanged {
                joined: joined.into_iter().collect(),
                left: left.into_iter().collect(),
            });
    }

    /// Drain everything sent so far
    pub fn take_sent(&self) -> Vec<SentMessage> {
        std::mem::take(&mut self.state.lock().sent)
    }

    /// Number of messages sent so far and not yet taken
    pub fn sent_count(&self) -> usize {
        self.state.lock().sent.len()
    }

    /// Make the next `count` sends fail as if the links were down
    pub fn fail_sends(&self, count: usize) {
        self.state.lock().failing_sends = count;
    }

    /// Whether the transport has been started
    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }

    /// Last registry version announced
    pub fn registry_version(&self) -> u64 {
        self.state.lock().registry_version
    }
}

impl Transport for MemoryTransport {
    fn start(&mut self) -> Result<()> {
        self.state.lock().started = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.state.lock().started = false;
    }

    fn send(&mut self, message: &ClientMessage, targets: &[ReplicaId]) -> Result<()> {
        let mut state = self.state.lock();
        if !state.started {
            return Err(Error::Transport("Transport not started".to_string()));
        }
        if state.failing_sends > 0 {
            state.failing_sends -= 1;
            return Err(Error::Transport("Link down".to_string()));
        }
        state.sent.push(SentMessage {
            message: message.to_value()?,
            targets: targets.to_vec(),
        });
        Ok(())
    }

    fn service(&mut self, limit: usize) -> Vec<TransportEvent> {
        let mut state = self.state.lock();
        if !state.started {
            return Vec::new();
        }
        let count = limit.min(state.inbound.len());
        state.inbound.drain(..count).collect()
    }

    fn registry_changed(&mut self, registry: &ReplicaRegistry) {
        self.state.lock().registry_version = registry.version();
    }
}
