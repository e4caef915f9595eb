//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define reconciliation metrics (probes, batches, sweeps, lock contention)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `host_probes_total` (counter): probes by host class and result
//! - `host_probe_duration_seconds` (histogram): probe latency by host class
//! - `host_batches_total` (counter): correction requests by variant
//! - `host_sweeps_total` (counter): sweep corrections by kind (timeout, release)
//! - `ledger_lock_contention_total` (counter): failed lock acquisitions
//! - `host_version_conflicts_total` (counter): stale-version write retries
//! - `host_status_tasks_in_flight` (gauge): tasks running on the status executor

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must run inside a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_probe(class: &'static str, passed: bool, started: Instant) {
    let result = if passed { "success" } else { "failed" };
    metrics::counter!("host_probes_total", "class" => class, "result" => result).increment(1);
    metrics::histogram!("host_probe_duration_seconds", "class" => class)
        .record(started.elapsed().as_secs_f64());
}

pub fn record_batch(variant: &'static str) {
    metrics::counter!("host_batches_total", "variant" => variant).increment(1);
}

pub fn record_sweep(kind: &'static str) {
    metrics::counter!("host_sweeps_total", "kind" => kind).increment(1);
}

pub fn record_lock_contention() {
    metrics::counter!("ledger_lock_contention_total").increment(1);
}

pub fn record_version_conflict() {
    metrics::counter!("host_version_conflicts_total").increment(1);
}

pub fn set_tasks_in_flight(count: usize) {
    metrics::gauge!("host_status_tasks_in_flight").set(count as f64);
}
