//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, breaker state, rate limiting)
//! - Expose a Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, backend
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_rate_limited_total` (counter): denials by limiter
//! - `gateway_breaker_transitions_total` (counter): transitions by backend, state
//! - `gateway_breaker_short_circuits_total` (counter): fallbacks served while open

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on its own listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one forwarded request.
pub fn record_request(method: &str, status: u16, backend: &str, start: Instant) {
    let labels = vec![
        metrics::Label::new("method", method.to_string()),
        metrics::Label::new("status", status.to_string()),
        metrics::Label::new("backend", backend.to_string()),
    ];
    metrics::counter!("gateway_requests_total", labels.clone()).increment(1);
    metrics::histogram!("gateway_request_duration_seconds", labels)
        .record(start.elapsed().as_secs_f64());
}

/// Record a rate limiter denial.
pub fn record_rate_limited(limiter: &str) {
    metrics::counter!("gateway_rate_limited_total", "limiter" => limiter.to_string()).increment(1);
}

/// Record a breaker state transition.
pub fn record_breaker_state(backend: &str, state: &str) {
    metrics::counter!(
        "gateway_breaker_transitions_total",
        "backend" => backend.to_string(),
        "state" => state.to_string()
    )
    .increment(1);
}

/// Record a fallback served without a network call.
pub fn record_short_circuit(backend: &str) {
    metrics::counter!(
        "gateway_breaker_short_circuits_total",
        "backend" => backend.to_string()
    )
    .increment(1);
}
