//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): proxied requests by method, status, service
//! - `gateway_request_duration_seconds` (histogram): proxied request latency
//! - `gateway_circuit_open` (gauge): 1=open, 0=closed, per service
//! - `gateway_service_health` (gauge): 1=healthy, 0=unhealthy, per service
//! - `balancer_connections_total` (counter): accepted connections by target
//! - `balancer_active_connections` (gauge): spliced connections in flight
//! - `balancer_target_failures_total` (counter): socket failures by target
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   exporter every call is a no-op
//! - Prometheus exporter is opt-in via `observability.metrics_enabled`

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, service: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("service", service.to_string()),
    ];
    counter!("gateway_requests_total", &labels).increment(1);
    histogram!("gateway_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn record_circuit_state(service: &str, open: bool) {
    gauge!("gateway_circuit_open", "service" => service.to_string()).set(if open { 1.0 } else { 0.0 });
}

pub fn record_service_health(service: &str, healthy: bool) {
    gauge!("gateway_service_health", "service" => service.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_balancer_connection(target: &str) {
    counter!("balancer_connections_total", "target" => target.to_string()).increment(1);
}

pub fn record_balancer_active(active: u64) {
    gauge!("balancer_active_connections").set(active as f64);
}

pub fn record_target_failure(target: &str) {
    counter!("balancer_target_failures_total", "target" => target.to_string()).increment(1);
}
