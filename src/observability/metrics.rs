//! Metrics collection and exposition.
//!
//! # Metrics
//! - `http_requests_total` (counter): requests by method, status
//! - `http_request_duration_seconds` (histogram): latency by method
//! - `health_probe_healthy` (gauge): 1=healthy, 0=probing or stopped, per dependency
//! - `health_readiness_failures_total` (counter): failed readiness checks
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder with its own scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, duration: Duration) {
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("http_request_duration_seconds", "method" => method.to_string())
        .record(duration.as_secs_f64());
}

pub fn record_probe_health(dependency: &str, healthy: bool) {
    metrics::gauge!("health_probe_healthy", "dependency" => dependency.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_readiness_failure() {
    metrics::counter!("health_readiness_failures_total").increment(1);
}
