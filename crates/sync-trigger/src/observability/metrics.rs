//! Metrics definitions for the sync trigger.
//!
//! All metrics follow Prometheus naming conventions:
//! - `sync_trigger_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `method`: 7 values max (GET, POST, PATCH, DELETE, PUT, HEAD, OPTIONS)
//! - `endpoint`: 4 values (`/`, `/health`, `/metrics`, `/other`)
//! - `status`: 3 values (success, error, timeout)
//! - `reason`: bounded by `VerifyError::reason` and the header checks
//! - `outcome`: transferred, skipped, deleted

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded. Sync runs can take
/// minutes, so their buckets stretch to an hour.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("sync_trigger_http_request_duration_seconds".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 5.000, 30.000, 120.000,
                600.000, 3600.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Full("sync_trigger_sync_duration_seconds".to_string()),
            &[
                0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 1800.0, 3600.0,
            ],
        )
        .map_err(|e| format!("Failed to set sync duration buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `sync_trigger_http_requests_total`, `sync_trigger_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("sync_trigger_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("sync_trigger_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Collapse unknown paths to bound label cardinality.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/" => "/",
        "/health" => "/health",
        "/metrics" => "/metrics",
        _ => "/other",
    }
}

// ============================================================================
// Auth Metrics
// ============================================================================

/// Record a rejected request.
///
/// Metric: `sync_trigger_auth_failures_total`
/// Labels: `reason`
pub fn record_auth_failure(reason: &'static str) {
    counter!("sync_trigger_auth_failures_total", "reason" => reason).increment(1);
}

// ============================================================================
// Sync Metrics
// ============================================================================

/// Record a finished sync run.
///
/// Metric: `sync_trigger_sync_runs_total`, `sync_trigger_sync_duration_seconds`
/// Labels: `status` (success, error, cancelled)
pub fn record_sync_run(status: &'static str, duration: Duration) {
    histogram!("sync_trigger_sync_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());

    counter!("sync_trigger_sync_runs_total", "status" => status).increment(1);
}

/// Record per-object outcomes of a successful run.
///
/// Metric: `sync_trigger_sync_objects_total`
/// Labels: `outcome`
pub fn record_sync_objects(transferred: u64, skipped: u64, deleted: u64) {
    counter!("sync_trigger_sync_objects_total", "outcome" => "transferred").increment(transferred);
    counter!("sync_trigger_sync_objects_total", "outcome" => "skipped").increment(skipped);
    counter!("sync_trigger_sync_objects_total", "outcome" => "deleted").increment(deleted);
}

/// Record bytes copied by a successful run.
///
/// Metric: `sync_trigger_sync_bytes_total`
pub fn record_sync_bytes(bytes: u64) {
    counter!("sync_trigger_sync_bytes_total").increment(bytes);
}
