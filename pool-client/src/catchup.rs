//! Pool ledger catch-up coordination
//!
//! The ledger-sync engine is external: the client routes pool-protocol
//! messages to a [`LedgerManager`] and drains its [`LedgerManagerEvent`]s.
//! The coordinator also keeps the client's own view of the pool ledger, from
//! which membership changes are derived.
//!
//! Every replica broadcasts each newly ordered pool transaction. A
//! transaction is appended only at the next sequence number and only once
//! `f + 1` replicas sent identical copies of it; copies for later sequence
//! numbers are held until their predecessors land.

use crate::{
    message::{CatchupRep, ConsistencyProof, PoolLedgerTxns},
    registry::RegistryCommand,
    types::ReplicaId,
    Error, Result,
};
use pool_ledger::{
    types::{field, LedgerId, LedgerStatus, Txn},
    PoolLedger, POOL_LEDGER_ID,
};
use serde_json::Value;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

/// Event raised by the ledger manager
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerManagerEvent {
    /// A ledger finished catching up
    CatchupComplete {
        /// Which ledger
        ledger_id: LedgerId,
    },

    /// A transaction obtained through catch-up was applied
    TxnApplied {
        /// Which ledger
        ledger_id: LedgerId,
        /// The transaction
        txn: Txn,
    },
}

/// Ledger-sync engine
pub trait LedgerManager: Send + fmt::Debug {
    /// A replica reported its ledger position
    fn on_ledger_status(&mut self, status: LedgerStatus, from: &ReplicaId);

    /// A replica sent a consistency proof
    fn on_consistency_proof(&mut self, proof: ConsistencyProof, from: &ReplicaId);

    /// A replica sent catch-up transactions
    fn on_catchup_reply(&mut self, reply: CatchupRep, from: &ReplicaId);

    /// Run pending actions, returning how many were performed
    fn service_actions(&mut self) -> usize;

    /// Allow or forbid syncing a ledger
    fn set_ledger_can_sync(&mut self, ledger_id: LedgerId, can_sync: bool);

    /// Mark a ledger as needing a fresh sync
    fn set_ledger_not_synced(&mut self, ledger_id: LedgerId);

    /// Drain raised events
    fn take_events(&mut self) -> Vec<LedgerManagerEvent>;
}

/// Sequence number carried by a pool transaction
fn seq_no_of(txn: &Txn) -> Option<u64> {
    txn.get(field::SEQ_NO).and_then(Value::as_u64)
}

/// Transaction without its proof fields
fn entry_of(mut txn: Txn) -> Txn {
    for name in field::PROOF_FIELDS {
        txn.remove(name);
    }
    txn
}

/// Copies of not yet appended transactions, by sequence number and sender
#[derive(Debug, Default)]
struct HeldTxns {
    by_seq_no: BTreeMap<u64, BTreeMap<ReplicaId, Txn>>,
}

impl HeldTxns {
    /// A replica's latest copy replaces its earlier one
    fn hold(&mut self, seq_no: u64, from: &ReplicaId, txn: Txn) {
        self.by_seq_no
            .entry(seq_no)
            .or_default()
            .insert(from.clone(), txn);
    }

    /// Take the copy of `seq_no` that at least `quorum` replicas agree on
    fn take_agreed(&mut self, seq_no: u64, quorum: usize) -> Option<Txn> {
        let copies = self.by_seq_no.get(&seq_no)?;
        let agreed = copies
            .values()
            .find(|candidate| copies.values().filter(|txn| txn == candidate).count() >= quorum)?
            .clone();
        self.by_seq_no.remove(&seq_no);
        Some(agreed)
    }

    /// Forget copies up to and including `seq_no`
    fn prune(&mut self, seq_no: u64) {
        self.by_seq_no = self.by_seq_no.split_off(&(seq_no + 1));
    }

    fn len(&self) -> usize {
        self.by_seq_no.len()
    }
}

/// Routes pool messages and owns the client's pool ledger view
#[derive(Debug)]
pub struct CatchupCoordinator {
    manager: Box<dyn LedgerManager>,
    ledger: PoolLedger,
    held: HeldTxns,
}

impl CatchupCoordinator {
    /// Create coordinator over a ledger view
    pub fn new(manager: Box<dyn LedgerManager>, ledger: PoolLedger) -> Self {
        Self {
            manager,
            ledger,
            held: HeldTxns::default(),
        }
    }

    /// Client's pool ledger view
    pub fn ledger(&self) -> &PoolLedger {
        &self.ledger
    }

    /// Client's pool ledger position
    pub fn status(&self) -> LedgerStatus {
        self.ledger.status()
    }

    /// Sequence numbers with copies waiting for agreement or a predecessor
    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    /// Ledger manager
    pub fn manager_mut(&mut self) -> &mut dyn LedgerManager {
        self.manager.as_mut()
    }

    /// Route a ledger status
    pub fn ledger_status(&mut self, status: LedgerStatus, from: &ReplicaId) {
        self.manager.on_ledger_status(status, from);
    }

    /// Route a consistency proof
    pub fn consistency_proof(&mut self, proof: ConsistencyProof, from: &ReplicaId) {
        self.manager.on_consistency_proof(proof, from);
    }

    /// Route a catch-up reply
    pub fn catchup_reply(&mut self, reply: CatchupRep, from: &ReplicaId) {
        self.manager.on_catchup_reply(reply, from);
    }

    /// Record one replica's copy of a newly ordered pool transaction
    ///
    /// Returns the membership changes of every transaction this copy allowed
    /// to be appended, in sequence order. Copies already covered by the
    /// ledger are ignored.
    pub fn pool_txn(
        &mut self,
        message: PoolLedgerTxns,
        from: &ReplicaId,
        quorum: usize,
    ) -> Result<Vec<RegistryCommand>> {
        let seq_no = seq_no_of(&message.txn).ok_or_else(|| {
            Error::Ledger(pool_ledger::Error::InvalidEntry(
                "Pool transaction without seqNo".to_string(),
            ))
        })?;

        let size = self.ledger.size();
        if seq_no <= size {
            tracing::debug!(
                "Pool transaction {} from {} already in ledger of size {}",
                seq_no,
                from,
                size
            );
            return Ok(Vec::new());
        }

        tracing::debug!("Pool transaction {} received from {}", seq_no, from);
        self.held.hold(seq_no, from, entry_of(message.txn));
        self.drain(quorum)
    }

    /// Apply a transaction the manager obtained through catch-up
    ///
    /// Transactions for ledgers other than the pool ledger are logged and
    /// ignored, as are transactions whose `seqNo` is not the next one.
    pub fn txn_applied(
        &mut self,
        ledger_id: LedgerId,
        txn: Txn,
        quorum: usize,
    ) -> Result<Vec<RegistryCommand>> {
        if ledger_id != POOL_LEDGER_ID {
            tracing::error!("Catch-up applied transaction for unknown ledger {}", ledger_id);
            return Ok(Vec::new());
        }

        let size = self.ledger.size();
        match seq_no_of(&txn) {
            Some(seq_no) if seq_no <= size => {
                tracing::debug!("Catch-up transaction {} already in ledger", seq_no);
                return Ok(Vec::new());
            }
            Some(seq_no) if seq_no > size + 1 => {
                tracing::warn!(
                    "Catch-up transaction {} skips ahead of ledger of size {}",
                    seq_no,
                    size
                );
                return Ok(Vec::new());
            }
            _ => {}
        }

        let mut commands: Vec<RegistryCommand> = self.append(txn)?.into_iter().collect();
        commands.extend(self.drain(quorum)?);
        Ok(commands)
    }

    /// Append held transactions while the next one has enough agreeing copies
    fn drain(&mut self, quorum: usize) -> Result<Vec<RegistryCommand>> {
        let mut commands = Vec::new();
        while let Some(txn) = self.held.take_agreed(self.ledger.size() + 1, quorum) {
            commands.extend(self.append(txn)?);
        }
        Ok(commands)
    }

    /// The entry stays in the ledger even when it carries no usable
    /// membership change.
    fn append(&mut self, txn: Txn) -> Result<Option<RegistryCommand>> {
        let txn = entry_of(txn);
        let seq_no = self.ledger.append(txn.clone())?;
        self.held.prune(seq_no);

        match RegistryCommand::from_pool_txn(&txn) {
            Ok(command) => Ok(command),
            Err(e) => {
                tracing::warn!("Pool transaction {} carries no usable membership change: {}", seq_no, e);
                Ok(None)
            }
        }
    }

    /// Run manager actions
    pub fn service_actions(&mut self) -> usize {
        self.manager.service_actions()
    }

    /// Drain manager events
    pub fn take_events(&mut self) -> Vec<LedgerManagerEvent> {
        self.manager.take_events()
    }

    /// Enable syncing of the pool ledger
    pub fn start_sync(&mut self) {
        self.manager.set_ledger_can_sync(POOL_LEDGER_ID, true);
    }

    /// Mark the pool ledger as not synced
    pub fn stop_sync(&mut self) {
        self.manager.set_ledger_not_synced(POOL_LEDGER_ID);
    }
}

/// Ledger manager that trusts the local pool ledger once enough replicas
/// report the same position
///
/// A catch-up transaction is re-raised, in sequence order, once `quorum`
/// replicas sent identical copies of it. This manager never requests missing
/// transactions itself; a replica that is ahead only shows up in the debug
/// log.
#[derive(Debug)]
pub struct StatusQuorumManager {
    quorum: usize,
    expected: LedgerStatus,
    agreeing: BTreeSet<ReplicaId>,
    can_sync: bool,
    complete: bool,
    pending_actions: usize,
    events: Vec<LedgerManagerEvent>,
    catchup: HeldTxns,
    next_seq_no: u64,
}

impl StatusQuorumManager {
    /// Complete once `quorum` replicas report `expected`
    pub fn new(quorum: usize, expected: LedgerStatus) -> Self {
        Self {
            quorum,
            next_seq_no: expected.txn_seq_no + 1,
            expected,
            agreeing: BTreeSet::new(),
            can_sync: false,
            complete: false,
            pending_actions: 0,
            events: Vec::new(),
            catchup: HeldTxns::default(),
        }
    }

    /// Whether catch-up has completed
    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

impl LedgerManager for StatusQuorumManager {
    fn on_ledger_status(&mut self, status: LedgerStatus, from: &ReplicaId) {
        if !self.can_sync || self.complete || status.ledger_id != self.expected.ledger_id {
            return;
        }
        if status != self.expected {
            tracing::debug!(
                "Replica {} reports ledger at {} while client is at {}",
                from,
                status.txn_seq_no,
                self.expected.txn_seq_no
            );
            return;
        }
        self.agreeing.insert(from.clone());
        self.pending_actions += 1;
    }

    fn on_consistency_proof(&mut self, proof: ConsistencyProof, from: &ReplicaId) {
        tracing::debug!(
            "Consistency proof {}..{} from {} ignored",
            proof.seq_no_start,
            proof.seq_no_end,
            from
        );
    }

    fn on_catchup_reply(&mut self, reply: CatchupRep, from: &ReplicaId) {
        if !self.can_sync {
            return;
        }
        tracing::debug!("Catch-up reply with {} txns from {}", reply.txns.len(), from);
        if reply.ledger_id != self.expected.ledger_id {
            return;
        }
        for (seq_no, txn) in reply.ordered_txns() {
            if seq_no >= self.next_seq_no {
                self.catchup.hold(seq_no, from, entry_of(txn.clone()));
            }
        }
        while let Some(mut txn) = self.catchup.take_agreed(self.next_seq_no, self.quorum) {
            txn.insert(field::SEQ_NO.to_string(), Value::from(self.next_seq_no));
            self.events.push(LedgerManagerEvent::TxnApplied {
                ledger_id: reply.ledger_id,
                txn,
            });
            self.catchup.prune(self.next_seq_no);
            self.next_seq_no += 1;
        }
    }

    fn service_actions(&mut self) -> usize {
        let performed = std::mem::take(&mut self.pending_actions);
        if !self.complete && self.can_sync && self.agreeing.len() >= self.quorum {
            self.complete = true;
            tracing::info!("Pool ledger caught up at {}", self.expected.txn_seq_no);
            self.events.push(LedgerManagerEvent::CatchupComplete {
                ledger_id: self.expected.ledger_id,
            });
        }
        performed
    }

    fn set_ledger_can_sync(&mut self, ledger_id: LedgerId, can_sync: bool) {
        if ledger_id == self.expected.ledger_id {
            self.can_sync = can_sync;
        }
    }

    fn set_ledger_not_synced(&mut self, ledger_id: LedgerId) {
        if ledger_id == self.expected.ledger_id {
            self.complete = false;
            self.agreeing.clear();
        }
    }

    fn take_events(&mut self) -> Vec<LedgerManagerEvent> {
        std::mem::take(&mut self.events)
    }
}
