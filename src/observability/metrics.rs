//! Metrics collection and exposition.
//!
//! # Metrics
//! - `http_requests_total` (counter): completed requests by method, status
//! - `http_request_duration_seconds` (histogram): latency distribution
//! - `http_open_connections` (gauge): connections currently served
//! - `service_ready` (gauge): 1=ready, 0=not ready
//! - `migrations_applied_total` (counter): units applied, by set
//! - `migration_failures_total` (counter): failed set runs, by set
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

const EXPONENTIAL_SECONDS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets(EXPONENTIAL_SECONDS)?
        .install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let labels = [("method", method.to_string()), ("status", status.to_string())];
    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_open_connections(count: u64) {
    metrics::gauge!("http_open_connections").set(count as f64);
}

pub fn record_readiness(ready: bool) {
    metrics::gauge!("service_ready").set(if ready { 1.0 } else { 0.0 });
}

pub fn record_migrations_applied(set: &'static str, count: usize) {
    metrics::counter!("migrations_applied_total", "set" => set).increment(count as u64);
}

pub fn record_migration_failure(set: &'static str) {
    metrics::counter!("migration_failures_total", "set" => set).increment(1);
}
