//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, route kind
//! - `proxy_request_duration_seconds` (histogram): time to response head
//! - `proxy_websocket_sessions` (gauge): currently open relay sessions
//! - `proxy_websocket_frames_total` (counter): frames forwarded by direction
//!
//! Without an installed recorder every call here is a no-op.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Start the Prometheus scrape endpoint. Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, route: &'static str, start: Instant) {
    metrics::counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "route" => route
    )
    .increment(1);
    metrics::histogram!("proxy_request_duration_seconds", "route" => route)
        .record(start.elapsed().as_secs_f64());
}

pub fn websocket_session_opened() {
    metrics::gauge!("proxy_websocket_sessions").increment(1.0);
}

pub fn websocket_session_closed() {
    metrics::gauge!("proxy_websocket_sessions").decrement(1.0);
}

pub fn record_ws_frames(direction: &'static str, frames: u64) {
    metrics::counter!("proxy_websocket_frames_total", "direction" => direction).increment(frames);
}
