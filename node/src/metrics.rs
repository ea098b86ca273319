//! # Prometheus Metrics
//!
//! Operational metrics for the service, scraped at `GET /metrics`.
//! Registered in a dedicated [`prometheus::Registry`] so they do not
//! collide with any default global registry consumers.
//!
//! Metric names describe the service's actual work: issuances, proof
//! verifications by outcome, cache effectiveness, and throttling.

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (prometheus handles are internally ref-counted) and
/// shared across request handlers as `Arc<ZeroIdMetrics>`.
#[derive(Clone)]
pub struct ZeroIdMetrics {
    /// Registry that owns all metrics below.
    registry: Registry,
    /// Total HTTP requests that reached a handler.
    pub requests_total: IntCounter,
    /// Requests rejected by the per-key rate limiter.
    pub rate_limited_total: IntCounter,
    /// Credentials successfully issued.
    pub credentials_issued_total: IntCounter,
    /// Proof submissions answered from either cache layer.
    pub proof_cache_hits_total: IntCounter,
    /// Fresh Groth16 verifications that returned valid.
    pub proofs_valid_total: IntCounter,
    /// Fresh Groth16 verifications that returned invalid.
    pub proofs_invalid_total: IntCounter,
    /// Submissions rejected as nullifier replays.
    pub proof_replays_total: IntCounter,
    /// Wall-clock latency of fresh proof verifications, seconds.
    pub verify_latency_seconds: Histogram,
}

impl ZeroIdMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("zeroid".into()), None)
            .expect("failed to create prometheus registry");

        fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
            let c = IntCounter::new(name, help).expect("metric creation");
            registry.register(Box::new(c.clone())).expect("metric registration");
            c
        }

        let requests_total = counter(
            &registry,
            "requests_total",
            "Total HTTP requests that reached a handler",
        );
        let rate_limited_total = counter(
            &registry,
            "rate_limited_total",
            "Requests rejected by the per-key rate limiter",
        );
        let credentials_issued_total = counter(
            &registry,
            "credentials_issued_total",
            "Credentials successfully issued",
        );
        let proof_cache_hits_total = counter(
            &registry,
            "proof_cache_hits_total",
            "Proof submissions answered from the verification cache",
        );
        let proofs_valid_total = counter(
            &registry,
            "proofs_valid_total",
            "Fresh verifications that returned valid",
        );
        let proofs_invalid_total = counter(
            &registry,
            "proofs_invalid_total",
            "Fresh verifications that returned invalid",
        );
        let proof_replays_total = counter(
            &registry,
            "proof_replays_total",
            "Submissions rejected as nullifier replays",
        );

        let verify_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "verify_latency_seconds",
                "Wall-clock latency of fresh proof verifications",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(verify_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            requests_total,
            rate_limited_total,
            credentials_issued_total,
            proof_cache_hits_total,
            proofs_valid_total,
            proofs_invalid_total,
            proof_replays_total,
            verify_latency_seconds,
        }
    }

    /// Encode the registry in Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!("metrics encoding failed: {}", e);
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl Default for ZeroIdMetrics {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedMetrics = Arc<ZeroIdMetrics>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_register_and_increment() {
        let metrics = ZeroIdMetrics::new();
        metrics.requests_total.inc();
        metrics.credentials_issued_total.inc();
        metrics.credentials_issued_total.inc();

        let exported = metrics.encode();
        assert!(exported.contains("zeroid_requests_total 1"));
        assert!(exported.contains("zeroid_credentials_issued_total 2"));
    }

    #[test]
    fn histogram_observes() {
        let metrics = ZeroIdMetrics::new();
        metrics.verify_latency_seconds.observe(0.004);
        let exported = metrics.encode();
        assert!(exported.contains("zeroid_verify_latency_seconds_count 1"));
    }
}
