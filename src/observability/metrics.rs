//! Metrics collection and exposition.
//!
//! # Metrics
//! - `greenlight_requests_total` (counter): requests by method, status
//! - `greenlight_request_duration_seconds` (histogram): latency distribution
//! - `greenlight_admission_rejected_total` (counter): rejections by reason
//! - `greenlight_background_tasks_total` (counter): finished tasks by outcome
//! - `greenlight_background_tasks_outstanding` (gauge): registered, unfinished tasks
//! - `greenlight_shutdown_state` (gauge): 0=running .. 4=forced stop
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "greenlight_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("greenlight_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_admission_rejected(reason: &'static str) {
    counter!("greenlight_admission_rejected_total", "reason" => reason).increment(1);
}

pub fn record_background_task(outcome: &'static str) {
    counter!("greenlight_background_tasks_total", "outcome" => outcome).increment(1);
}

pub fn set_background_outstanding(count: usize) {
    gauge!("greenlight_background_tasks_outstanding").set(count as f64);
}

pub fn record_shutdown_state(state: u8) {
    gauge!("greenlight_shutdown_state").set(f64::from(state));
}
