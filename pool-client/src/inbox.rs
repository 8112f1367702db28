//! Append-only log of messages received from replicas

use crate::{
    message::{request_id_of, MessageKind, RESULT_FIELD},
    types::{ReplicaId, RequestId},
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

/// One received message
#[derive(Debug, Clone, PartialEq)]
pub struct InboxEntry {
    /// Message as received
    pub message: Value,
    /// Sending replica
    pub from: ReplicaId,
    /// Arrival time (observability only)
    pub received_at: DateTime<Utc>,
}

impl InboxEntry {
    /// Result object if this entry is a reply
    pub fn reply_result(&self) -> Option<&Value> {
        if MessageKind::of(&self.message) == MessageKind::Reply {
            self.message.get(RESULT_FIELD)
        } else {
            None
        }
    }
}

/// Inbox with a request-id index over replies
#[derive(Debug, Clone, Default)]
pub struct Inbox {
    entries: Vec<InboxEntry>,
    replies: HashMap<RequestId, Vec<usize>>,
}

impl Inbox {
    /// Create empty inbox
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message, indexing it if it is a reply
    pub fn push(&mut self, message: Value, from: ReplicaId) {
        let position = self.entries.len();
        let entry = InboxEntry {
            message,
            from,
            received_at: Utc::now(),
        };

        let req_id = entry
            .reply_result()
            .and_then(Value::as_object)
            .and_then(request_id_of);
        if let Some(req_id) = req_id {
            self.replies.entry(req_id).or_default().push(position);
        }

        self.entries.push(entry);
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if inbox is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in arrival order
    pub fn iter(&self) -> impl Iterator<Item = &InboxEntry> {
        self.entries.iter()
    }

    /// Replies for a request in arrival order, as `(sender, result)`
    pub fn replies_for(&self, req_id: RequestId) -> impl Iterator<Item = (&ReplicaId, &Value)> {
        self.replies
            .get(&req_id)
            .into_iter()
            .flatten()
            .filter_map(move |&position| {
                let entry = &self.entries[position];
                entry.reply_result().map(|result| (&entry.from, result))
            })
    }
}
