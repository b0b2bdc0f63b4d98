//! Metrics collection and exposition.
//!
//! # Metrics
//! - `plant_care_http_requests_total` (counter): requests by method, path, status
//! - `plant_care_http_request_duration_seconds` (histogram): latency distribution
//! - `plant_care_rate_limited_total` (counter): rejections by rule
//! - `plant_care_circuit_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `plant_care_events_total` (counter): published events by type and outcome
//! - `plant_care_jobs_total` (counter): background task runs by task and outcome
//! - `plant_care_cache_entries` (gauge): live cache entries
//! - `plant_care_users_registered_total` (counter): business KPI
//! - `plant_care_api_calls_total` (counter): external API calls by provider and outcome
//!
//! The Prometheus recorder is process-global; the handle is rendered at
//! `GET /metrics` by the HTTP server.

use std::sync::OnceLock;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

static HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Install the Prometheus recorder once and return its handle.
pub fn init_metrics() -> Option<PrometheusHandle> {
    HANDLE
        .get_or_init(|| {
            let builder = match PrometheusBuilder::new().set_buckets_for_metric(
                Matcher::Full("plant_care_http_request_duration_seconds".to_string()),
                LATENCY_BUCKETS,
            ) {
                Ok(builder) => builder,
                Err(e) => {
                    tracing::error!(error = %e, "Invalid histogram buckets");
                    return None;
                }
            };

            match builder.install_recorder() {
                Ok(handle) => {
                    tracing::info!("Prometheus metrics recorder installed");
                    Some(handle)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install metrics recorder");
                    None
                }
            }
        })
        .clone()
}

pub fn record_request(method: &str, path: &str, status: u16, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];
    counter!("plant_care_http_requests_total", &labels).increment(1);
    histogram!("plant_care_http_request_duration_seconds", &labels[..2])
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(rule: &str) {
    counter!("plant_care_rate_limited_total", "rule" => rule.to_string()).increment(1);
}

pub fn record_circuit_state(service: &str, state_value: f64) {
    gauge!("plant_care_circuit_state", "service" => service.to_string()).set(state_value);
}

pub fn record_event(event_type: &str, outcome: &'static str) {
    counter!(
        "plant_care_events_total",
        "event_type" => event_type.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_job(task: &str, outcome: &'static str) {
    counter!("plant_care_jobs_total", "task" => task.to_string(), "outcome" => outcome)
        .increment(1);
}

pub fn record_cache_size(entries: usize) {
    gauge!("plant_care_cache_entries").set(entries as f64);
}

pub fn record_user_registered() {
    counter!("plant_care_users_registered_total").increment(1);
}

pub fn record_api_call(provider: &str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!(
        "plant_care_api_calls_total",
        "provider" => provider.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}
