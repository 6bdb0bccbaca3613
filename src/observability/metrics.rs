//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): completed requests by method, status
//! - `proxy_request_duration_seconds` (histogram): time until the response completed
//! - `proxy_upstream_errors_total` (counter): upstream failures by kind (timeout, connect)
//! - `proxy_attack_triggers_total` (counter): attack detector breaches by watched path
//!
//! Recording is a no-op until a recorder is installed, so library users that
//! never call [`init_metrics`] pay almost nothing.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one completed request.
pub fn record_request(method: &str, status: u16, duration: Duration) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds").record(duration.as_secs_f64());
}

/// Record an upstream failure.
pub fn record_upstream_error(kind: &'static str) {
    counter!("proxy_upstream_errors_total", "kind" => kind).increment(1);
}

/// Record an attack detector breach.
pub fn record_attack_trigger(path: &str) {
    counter!("proxy_attack_triggers_total", "path" => path.to_string()).increment(1);
}
