//! Reply quorum resolution
//!
//! A result is trusted once more than `f` distinct replicas returned it: at
//! least one of them must be honest.
//!
//! # Resolution rule
//!
//! Replies are scanned in arrival order. Each replica counts once, with its
//! latest reply so far. The outcome is `Confirmed` with the first result whose
//! support exceeds `f` at some point of that scan. Because the inbox only
//! grows, an outcome that is `Confirmed` stays `Confirmed` with the same
//! result. When no replica replies twice this is the same as grouping the
//! latest replies and picking a partition larger than `f`.

use crate::{
    fault::FaultParameters,
    inbox::Inbox,
    types::{ReplicaId, RequestId},
};
use serde_json::Value;
use std::{collections::HashMap, fmt};

/// Outcome of resolving one request
#[derive(Debug, Clone, PartialEq)]
pub enum ConsensusOutcome {
    /// No replies yet
    NotFound,
    /// Fewer than `f + 1` replicas replied
    Unconfirmed,
    /// More than `f` replicas agree on this result
    Confirmed(Value),
    /// Enough replicas replied but no result has more than `f` supporters
    IndeterminateDisagreement,
}

impl ConsensusOutcome {
    /// Status string as reported to users
    pub fn status(&self) -> ReplyStatus {
        match self {
            ConsensusOutcome::NotFound => ReplyStatus::NotFound,
            ConsensusOutcome::Unconfirmed | ConsensusOutcome::IndeterminateDisagreement => {
                ReplyStatus::Unconfirmed
            }
            ConsensusOutcome::Confirmed(_) => ReplyStatus::Confirmed,
        }
    }

    /// Confirmed result, if any
    pub fn confirmed(&self) -> Option<&Value> {
        match self {
            ConsensusOutcome::Confirmed(result) => Some(result),
            _ => None,
        }
    }
}

/// Coarse reply status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    /// No replies
    NotFound,
    /// Not (yet) agreed
    Unconfirmed,
    /// Agreed
    Confirmed,
}

impl fmt::Display for ReplyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReplyStatus::NotFound => "NOT_FOUND",
            ReplyStatus::Unconfirmed => "UNCONFIRMED",
            ReplyStatus::Confirmed => "CONFIRMED",
        };
        f.write_str(s)
    }
}

/// Resolve the replies for one request against the fault parameters
pub fn resolve(inbox: &Inbox, req_id: RequestId, params: &FaultParameters) -> ConsensusOutcome {
    resolve_replies(inbox.replies_for(req_id), params.f)
}

/// Resolve an arrival-ordered sequence of `(sender, result)` replies
///
/// Each replica counts once, with its latest reply. The first result backed
/// by more than `f` replicas is confirmed and resolution stops there, so a
/// replica that later sends a different reply cannot overturn a confirmed
/// result. Latest-reply-wins only matters before confirmation.
pub fn resolve_replies<'a>(
    replies: impl IntoIterator<Item = (&'a ReplicaId, &'a Value)>,
    f: usize,
) -> ConsensusOutcome {
    let mut latest: HashMap<&ReplicaId, &Value> = HashMap::new();

    for (from, result) in replies {
        latest.insert(from, result);

        // Only the result just received can have gained support
        let support = latest.values().filter(|r| **r == result).count();
        if support > f {
            return ConsensusOutcome::Confirmed(result.clone());
        }
    }

    if latest.is_empty() {
        ConsensusOutcome::NotFound
    } else if latest.len() < f + 1 {
        ConsensusOutcome::Unconfirmed
    } else {
        ConsensusOutcome::IndeterminateDisagreement
    }
}
