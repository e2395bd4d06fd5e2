//! Prometheus metrics.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, service, status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_rate_limited_total` (counter): rejections by key kind
//! - `gateway_circuit_open_total` (counter): blocked calls by service
//! - `gateway_instance_health` (gauge): 1=healthy, 0=unhealthy
//!
//! All recorders are no-ops until an exporter is installed.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Install the Prometheus exporter with its own scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, service: &str, status: u16, duration: Duration) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "service" => service.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(
        "gateway_request_duration_seconds",
        "method" => method.to_string(),
        "service" => service.to_string()
    )
    .record(duration.as_secs_f64());
}

/// `kind` is the key prefix, `user` or `ip`.
pub fn record_rate_limited(kind: &str) {
    counter!("gateway_rate_limited_total", "kind" => kind.to_string()).increment(1);
}

pub fn record_circuit_open(service: &str) {
    counter!("gateway_circuit_open_total", "service" => service.to_string()).increment(1);
}

pub fn record_instance_health(service: &str, endpoint: &str, healthy: bool) {
    gauge!(
        "gateway_instance_health",
        "service" => service.to_string(),
        "endpoint" => endpoint.to_string()
    )
    .set(if healthy { 1.0 } else { 0.0 });
}
