//! Metrics collection and exposition.
//!
//! # Metrics
//! - `batch_requests_total` (counter): inbound batches by response status
//! - `batch_sub_requests_total` (counter): sub-requests by outcome (`response` / `failure`)
//! - `batch_size` (histogram): sub-requests per dispatched batch
//! - `batch_dispatch_duration_seconds` (histogram): time from fan-out to join

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_batch(status: u16) {
    counter!("batch_requests_total", "status" => status.to_string()).increment(1);
}

pub fn record_sub_request(failed: bool) {
    let outcome = if failed { "failure" } else { "response" };
    counter!("batch_sub_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_dispatch(size: usize, started: Instant) {
    histogram!("batch_size").record(size as f64);
    histogram!("batch_dispatch_duration_seconds").record(started.elapsed().as_secs_f64());
}
