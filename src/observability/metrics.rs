//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_requests_total` (counter): requests by relay path and outcome
//! - `relay_active_tunnels` (gauge): upgrade connections currently spliced

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter")
        }
    }
}

/// Count one relayed request. `path` is `http` or `upgrade`; `outcome` is the
/// client-facing status code, or `none` when no response was produced.
pub fn record_relay(path: &'static str, outcome: String) {
    metrics::counter!("relay_requests_total", "path" => path, "outcome" => outcome).increment(1);
}

pub fn tunnel_opened() {
    metrics::gauge!("relay_active_tunnels").increment(1.0);
}

pub fn tunnel_closed() {
    metrics::gauge!("relay_active_tunnels").decrement(1.0);
}
