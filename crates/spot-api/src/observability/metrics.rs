//! Metrics definitions for the admission layer.
//!
//! All metrics follow Prometheus naming conventions:
//! - `api_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded enumerations:
//! - `reason`: `AuthError::kind()` values plus `RATE_LIMITED`
//! - `path`: self, provider, anonymous
//! - `status`: revoked, clear, timeout, error (revocation); success, error (JWKS)
//! - `kind`: access, refresh
//! - `decision`: allowed, rejected
//!
//! No client addresses, subjects or token identifiers are ever used as labels.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return the handle that renders
/// `/metrics`.
///
/// Revocation check buckets are centred on the default 500ms store timeout.
///
/// # Errors
///
/// Returns error if the recorder cannot be installed (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("api_revocation_check".to_string()),
            &[
                0.001, 0.002, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set revocation check buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// Admission
// ============================================================================

/// Metric: `api_admission_rejections_total{reason}`
pub fn record_admission_rejection(reason: &'static str) {
    counter!("api_admission_rejections_total", "reason" => reason).increment(1);
}

/// Metric: `api_admission_success_total{path}`
pub fn record_admission_success(path: &'static str) {
    counter!("api_admission_success_total", "path" => path).increment(1);
}

// ============================================================================
// Revocation
// ============================================================================

/// Metric: `api_revocation_checks_total{status}`, `api_revocation_check_duration_seconds`
pub fn record_revocation_check(status: &'static str, duration: Duration) {
    histogram!("api_revocation_check_duration_seconds").record(duration.as_secs_f64());
    counter!("api_revocation_checks_total", "status" => status).increment(1);
}

/// Metric: `api_revocations_total{kind}`
pub fn record_revocation(kind: &'static str) {
    counter!("api_revocations_total", "kind" => kind).increment(1);
}

// ============================================================================
// Rate limiting
// ============================================================================

/// Metric: `api_rate_limit_decisions_total{decision}`
pub fn record_rate_limit_decision(allowed: bool) {
    let decision = if allowed { "allowed" } else { "rejected" };
    counter!("api_rate_limit_decisions_total", "decision" => decision).increment(1);
}

/// Metric: `api_rate_limiter_tracked_clients`
#[allow(clippy::cast_precision_loss)]
pub fn set_tracked_clients(count: usize) {
    gauge!("api_rate_limiter_tracked_clients").set(count as f64);
}

// ============================================================================
// JWKS
// ============================================================================

/// Metric: `api_jwks_refresh_total{status}`
pub fn record_jwks_refresh(status: &'static str) {
    counter!("api_jwks_refresh_total", "status" => status).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    // These run against the global no-op recorder; they only prove the
    // recording paths do not panic without an installed exporter.

    #[test]
    fn test_record_admission() {
        record_admission_rejection("REVOKED");
        record_admission_rejection("RATE_LIMITED");
        record_admission_success("self");
        record_admission_success("anonymous");
    }

    #[test]
    fn test_record_revocation() {
        record_revocation_check("clear", Duration::from_millis(2));
        record_revocation_check("timeout", Duration::from_millis(500));
        record_revocation("access");
    }

    #[test]
    fn test_record_rate_limit_and_jwks() {
        record_rate_limit_decision(true);
        record_rate_limit_decision(false);
        set_tracked_clients(12);
        record_jwks_refresh("success");
    }
}
