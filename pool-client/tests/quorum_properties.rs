//! Property-based tests for fault arithmetic and reply quorum resolution
//!
//! These tests use proptest to verify:
//! - Fault parameters follow `f = (n - 1) / 3` and `min = f + 1`
//! - A confirmed outcome survives any further replies (monotonicity)
//! - Without duplicate senders the outcome matches result partitioning
//! - Fixed scenarios for f = 1 and f = 2 pools

use pool_client::{
    quorum::resolve_replies, ConsensusOutcome, FaultParameters, ReplicaId,
};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::HashMap;

fn replica(i: usize) -> ReplicaId {
    ReplicaId::new(format!("Node{}", i))
}

fn result(v: u8) -> Value {
    json!({"reqId": 1, "txnId": format!("txn-{}", v)})
}

fn resolve(replies: &[(ReplicaId, Value)], f: usize) -> ConsensusOutcome {
    resolve_replies(replies.iter().map(|(id, r)| (id, r)), f)
}

/// Strategy for a pool size and an arrival sequence of (sender, result)
fn arrivals_strategy() -> impl Strategy<Value = (usize, Vec<(usize, u8)>)> {
    (1usize..11).prop_flat_map(|n| {
        (
            Just(n),
            prop::collection::vec((0..n, 0u8..3), 0..24),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Property: f and min connections derive from the pool size
    #[test]
    fn prop_fault_parameters(n in 1usize..200) {
        let params = FaultParameters::derive(n).unwrap();
        prop_assert_eq!(params.f, (n - 1) / 3);
        prop_assert_eq!(params.min_required_connections, params.f + 1);
        prop_assert!(3 * params.f < n);
    }

    /// Property: once confirmed, more replies never change the result
    #[test]
    fn prop_resolve_is_monotone((n, arrivals) in arrivals_strategy(), cut in any::<prop::sample::Index>()) {
        let f = FaultParameters::derive(n).unwrap().f;
        let replies: Vec<(ReplicaId, Value)> = arrivals
            .iter()
            .map(|(sender, v)| (replica(*sender), result(*v)))
            .collect();
        let split = if replies.is_empty() { 0 } else { cut.index(replies.len() + 1) };

        if let ConsensusOutcome::Confirmed(early) = resolve(&replies[..split], f) {
            prop_assert_eq!(resolve(&replies, f), ConsensusOutcome::Confirmed(early));
        }
    }

    /// Property: with one reply per replica the outcome follows the partition sizes
    #[test]
    fn prop_distinct_senders_follow_partitions(n in 1usize..11, results in prop::collection::vec(0u8..3, 0..11)) {
        let f = FaultParameters::derive(n).unwrap().f;
        let replies: Vec<(ReplicaId, Value)> = results
            .iter()
            .take(n)
            .enumerate()
            .map(|(i, v)| (replica(i), result(*v)))
            .collect();

        let mut partitions: HashMap<&Value, usize> = HashMap::new();
        for (_, r) in &replies {
            *partitions.entry(r).or_default() += 1;
        }

        match resolve(&replies, f) {
            ConsensusOutcome::NotFound => prop_assert!(replies.is_empty()),
            ConsensusOutcome::Unconfirmed => {
                prop_assert!(!replies.is_empty());
                prop_assert!(replies.len() < f + 1);
            }
            ConsensusOutcome::Confirmed(value) => {
                prop_assert!(partitions.get(&value).copied().unwrap_or(0) > f);
            }
            ConsensusOutcome::IndeterminateDisagreement => {
                prop_assert!(replies.len() >= f + 1);
                prop_assert!(partitions.values().all(|size| *size <= f));
            }
        }
    }
}

#[test]
fn test_four_replica_pool_thresholds() {
    let f = FaultParameters::derive(4).unwrap().f;
    assert_eq!(f, 1);

    assert_eq!(resolve(&[], f), ConsensusOutcome::NotFound);

    let one = vec![(replica(0), result(0))];
    assert_eq!(resolve(&one, f), ConsensusOutcome::Unconfirmed);

    let two = vec![(replica(0), result(0)), (replica(1), result(0))];
    assert_eq!(resolve(&two, f), ConsensusOutcome::Confirmed(result(0)));
}

#[test]
fn test_single_byzantine_reply_is_outvoted() {
    let replies = vec![
        (replica(0), result(0)),
        (replica(3), result(9)),
        (replica(1), result(0)),
        (replica(2), result(0)),
    ];
    assert_eq!(resolve(&replies, 1), ConsensusOutcome::Confirmed(result(0)));
}

#[test]
fn test_seven_replica_split_is_indeterminate() {
    let f = FaultParameters::derive(7).unwrap().f;
    assert_eq!(f, 2);

    let replies = vec![
        (replica(0), result(0)),
        (replica(1), result(0)),
        (replica(2), result(1)),
        (replica(3), result(1)),
        (replica(4), result(2)),
    ];
    let outcome = resolve(&replies, f);
    assert_eq!(outcome, ConsensusOutcome::IndeterminateDisagreement);
    assert_eq!(outcome.status().to_string(), "UNCONFIRMED");
}

#[test]
fn test_repeated_sender_counts_once() {
    let replies = vec![
        (replica(0), result(0)),
        (replica(0), result(0)),
        (replica(0), result(0)),
    ];
    assert_eq!(resolve(&replies, 1), ConsensusOutcome::Unconfirmed);
}
