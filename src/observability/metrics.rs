//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gate_auth_failures_total` (counter): authentication failures by kind
//! - `gate_authz_denials_total` (counter): authorization denials by kind
//! - `gate_rate_limit_decisions_total` (counter): decisions by policy and outcome
//! - `gate_store_failures_total` (counter): shared store errors and timeouts by operation
//! - `gate_session_cache_total` (counter): session cache lookups by result
//! - `gate_activity_dropped_total` (counter): activity events dropped on overflow
//! - `gate_request_duration_seconds` (histogram): request latency by method and status
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until a recorder is installed
//! - Label values are static strings to keep cardinality bounded
//! - Histogram buckets tuned for an auth gate in front of a CMS

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};

const REQUEST_DURATION: &str = "gate_request_duration_seconds";

const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(Matcher::Full(REQUEST_DURATION.to_string()), LATENCY_BUCKETS)?
        .install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_auth_failure(kind: &'static str) {
    ::metrics::counter!("gate_auth_failures_total", "kind" => kind).increment(1);
}

pub fn record_authz_denial(kind: &'static str) {
    ::metrics::counter!("gate_authz_denials_total", "kind" => kind).increment(1);
}

/// `outcome` is one of `allowed`, `rejected` or `degraded`.
pub fn record_rate_limit_decision(policy: &'static str, outcome: &'static str) {
    ::metrics::counter!(
        "gate_rate_limit_decisions_total",
        "policy" => policy,
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_store_failure(op: &'static str) {
    ::metrics::counter!("gate_store_failures_total", "op" => op).increment(1);
}

pub fn record_session_cache(result: &'static str) {
    ::metrics::counter!("gate_session_cache_total", "result" => result).increment(1);
}

pub fn record_activity_dropped() {
    ::metrics::counter!("gate_activity_dropped_total").increment(1);
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    ::metrics::histogram!(
        REQUEST_DURATION,
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}
