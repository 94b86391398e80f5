//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_requests_total` (counter): relayed requests by method, status, target
//! - `relay_request_duration_seconds` (histogram): time to response head
//! - `relay_sessions` (gauge): records held by the state store
//! - `relay_upstream_dials_total` (counter): dial outcomes by target
//! - `relay_health_state` (gauge): 0=starting, 1=ready, 2=degraded, 3=unready
//!
//! # Design Decisions
//! - The `metrics` facade is always called; without an installed exporter
//!   every update is a no-op
//! - Prometheus is served on its own listener, never on the relay port

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::health::HealthState;

/// Start the Prometheus exporter on `addr`. Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one relayed request.
pub fn record_request(method: &str, status: u16, target: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("target", target.to_string()),
    ];
    ::metrics::counter!("relay_requests_total", &labels).increment(1);
    ::metrics::histogram!("relay_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_sessions(count: usize) {
    ::metrics::gauge!("relay_sessions").set(count as f64);
}

/// `outcome` is `ok` or `failed`.
pub fn record_dial(target: &str, outcome: &'static str) {
    ::metrics::counter!(
        "relay_upstream_dials_total",
        "target" => target.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_health_state(state: HealthState) {
    ::metrics::gauge!("relay_health_state").set(state as u8 as f64);
}
