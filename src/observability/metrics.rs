//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by route, status
//! - `gateway_request_duration_seconds` (histogram): latency by route
//! - `gateway_service_endpoints` (gauge): endpoints per discovered service
//! - `gateway_discovery_connected` (gauge): 1 = watch stream healthy
//!
//! # Design Decisions
//! - Metric updates are cheap (atomic operations behind the recorder)
//! - Exposed via a Prometheus scrape endpoint on its own listener

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one proxied request.
pub fn record_request(route: &str, status: u16, start: Instant) {
    counter!(
        "gateway_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(
        "gateway_request_duration_seconds",
        "route" => route.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

/// Record the size of a published endpoint set.
pub fn record_endpoint_count(service: &str, count: usize) {
    gauge!(
        "gateway_service_endpoints",
        "service" => service.to_string()
    )
    .set(count as f64);
}

/// Record watch stream health for a service.
pub fn record_discovery_connected(service: &str, connected: bool) {
    gauge!(
        "gateway_discovery_connected",
        "service" => service.to_string()
    )
    .set(if connected { 1.0 } else { 0.0 });
}
