//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): finished requests by route, status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_open_connections` (gauge): current connection count
//! - `gateway_faults_total` (counter): recovered faults by kind
//! - `gateway_contexts_created_total` (counter): pool misses
//! - `gateway_upstream_calls_total` (counter): upstream calls by method, outcome
//!
//! Without an installed recorder every call here is a no-op.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(route: &'static str, status: u16, start: Instant) {
    metrics::counter!(
        "gateway_requests_total",
        "route" => route,
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "route" => route)
        .record(start.elapsed().as_secs_f64());
}

pub fn connection_opened() {
    metrics::gauge!("gateway_open_connections").increment(1.0);
}

pub fn connection_closed() {
    metrics::gauge!("gateway_open_connections").decrement(1.0);
}

pub fn record_fault(kind: &'static str) {
    metrics::counter!("gateway_faults_total", "kind" => kind).increment(1);
}

pub fn record_context_created() {
    metrics::counter!("gateway_contexts_created_total").increment(1);
}

pub fn record_upstream_call(method: &'static str, outcome: &'static str) {
    metrics::counter!(
        "gateway_upstream_calls_total",
        "method" => method,
        "outcome" => outcome
    )
    .increment(1);
}
