//! Metrics collection for observability
//!
//! Prometheus metrics for the pool client, registered on a private registry.
//!
//! # Metrics
//!
//! - `pool_client_requests_submitted_total` - Requests created by `submit`
//! - `pool_client_requests_queued_total` - Requests queued awaiting readiness
//! - `pool_client_requests_flushed_total` - Queued requests released for dispatch
//! - `pool_client_replies_received_total` - Replies appended to the inbox
//! - `pool_client_messages_dropped_total` - Messages dropped as undecodable
//! - `pool_client_confirmed_total` - Resolutions that reached a quorum
//! - `pool_client_disagreements_total` - Resolutions with Byzantine disagreement
//! - `pool_client_proof_failures_total` - Replies whose Merkle proof failed
//! - `pool_client_connected_replicas` - Connected configured replicas

use prometheus::{IntCounter, IntGauge, Registry};
use std::{fmt, sync::Arc};

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Requests created
    pub requests_submitted: IntCounter,

    /// Requests queued
    pub requests_queued: IntCounter,

    /// Requests flushed from the queue
    pub requests_flushed: IntCounter,

    /// Replies received
    pub replies_received: IntCounter,

    /// Messages dropped
    pub messages_dropped: IntCounter,

    /// Confirmed resolutions
    pub confirmed: IntCounter,

    /// Disagreeing resolutions
    pub disagreements: IntCounter,

    /// Failed proofs
    pub proof_failures: IntCounter,

    /// Connected replicas
    pub connected_replicas: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let counter = |name: &str, help: &str| -> prometheus::Result<IntCounter> {
            let counter = IntCounter::new(name, help)?;
            registry.register(Box::new(counter.clone()))?;
            Ok(counter)
        };

        let requests_submitted = counter(
            "pool_client_requests_submitted_total",
            "Requests created by submit",
        )?;
        let requests_queued = counter(
            "pool_client_requests_queued_total",
            "Requests queued awaiting readiness",
        )?;
        let requests_flushed = counter(
            "pool_client_requests_flushed_total",
            "Queued requests released for dispatch",
        )?;
        let replies_received = counter(
            "pool_client_replies_received_total",
            "Replies appended to the inbox",
        )?;
        let messages_dropped = counter(
            "pool_client_messages_dropped_total",
            "Messages dropped as undecodable",
        )?;
        let confirmed = counter(
            "pool_client_confirmed_total",
            "Resolutions that reached a quorum",
        )?;
        let disagreements = counter(
            "pool_client_disagreements_total",
            "Resolutions with Byzantine disagreement",
        )?;
        let proof_failures = counter(
            "pool_client_proof_failures_total",
            "Replies whose Merkle proof failed",
        )?;

        let connected_replicas = IntGauge::new(
            "pool_client_connected_replicas",
            "Connected configured replicas",
        )?;
        registry.register(Box::new(connected_replicas.clone()))?;

        Ok(Self {
            requests_submitted,
            requests_queued,
            requests_flushed,
            replies_received,
            messages_dropped,
            confirmed,
            disagreements,
            proof_failures,
            connected_replicas,
            registry,
        })
    }

    /// Encode all metrics in the Prometheus text format
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!("Failed to encode metrics: {}", e);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl fmt::Debug for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metrics")
            .field("requests_submitted", &self.requests_submitted.get())
            .field("replies_received", &self.replies_received.get())
            .field("connected_replicas", &self.connected_replicas.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        metrics.requests_submitted.inc();
        metrics.connected_replicas.set(3);
        assert_eq!(metrics.requests_submitted.get(), 1);
        assert_eq!(metrics.connected_replicas.get(), 3);
    }

    #[test]
    fn test_independent_instances() {
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();
        first.confirmed.inc();
        assert_eq!(second.confirmed.get(), 0);
        assert!(first.gather().contains("pool_client_confirmed_total 1"));
    }
}
