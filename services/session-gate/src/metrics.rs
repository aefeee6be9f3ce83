//! Prometheus metrics exposition
//!
//! - `auth_requests_total` (counter): labels `operation`, `outcome`
//! - `auth_request_duration_seconds` (histogram): label `operation`
//! - `auth_rate_limited_total` (counter)

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// Bucket boundaries from 1ms to 5s. Login and register are dominated by
/// bcrypt, refresh and logout by a single store round trip.
const DURATION_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full("auth_request_duration_seconds".to_string()),
        DURATION_BUCKETS,
    )
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// Record a completed auth operation.
pub fn record_request(operation: &'static str, outcome: &'static str, duration_secs: f64) {
    metrics::counter!("auth_requests_total", "operation" => operation, "outcome" => outcome)
        .increment(1);
    metrics::histogram!("auth_request_duration_seconds", "operation" => operation)
        .record(duration_secs);
}

/// Record a login rejected by the rate limiter.
pub fn record_rate_limited() {
    metrics::counter!("auth_rate_limited_total").increment(1);
}
