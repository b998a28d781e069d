//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by lms-progress and provides
//! functions for initializing, registering, and exporting metrics.

use prometheus::{CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global Prometheus registry for all lms-progress metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Accepted progress reports, labeled by kind (video/content).
pub static PROGRESS_REPORTS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Completion rows created, labeled by level (content/course/plan).
pub static COMPLETIONS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Graded test attempts, labeled by outcome (passed/failed).
pub static TEST_ATTEMPTS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Distribution of attempt scores.
pub static TEST_SCORE: OnceLock<Histogram> = OnceLock::new();

/// Certificates and badges issued, labeled by level and artifact.
pub static CERTIFICATES_ISSUED_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Rejected operations, labeled by error code.
pub static REJECTIONS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Call once at start-up. Later calls leave the first registration in place.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails, typically due to
/// duplicate metric names or invalid metric configurations.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let progress_reports_total = CounterVec::new(
        Opts::new("lms_progress_reports_total", "Accepted progress reports"),
        &["kind"],
    )?;

    let completions_total = CounterVec::new(
        Opts::new("lms_completions_total", "Completion records created"),
        &["level"],
    )?;

    let test_attempts_total = CounterVec::new(
        Opts::new("lms_test_attempts_total", "Graded test attempts"),
        &["outcome"],
    )?;

    let test_score = Histogram::with_opts(
        HistogramOpts::new("lms_test_score", "Distribution of test attempt scores")
            .buckets(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0]),
    )?;

    let certificates_issued_total = CounterVec::new(
        Opts::new(
            "lms_certificates_issued_total",
            "Certificates and badges issued",
        ),
        &["level", "artifact"],
    )?;

    let rejections_total = CounterVec::new(
        Opts::new("lms_rejections_total", "Rejected operations by error code"),
        &["reason"],
    )?;

    registry.register(Box::new(progress_reports_total.clone()))?;
    registry.register(Box::new(completions_total.clone()))?;
    registry.register(Box::new(test_attempts_total.clone()))?;
    registry.register(Box::new(test_score.clone()))?;
    registry.register(Box::new(certificates_issued_total.clone()))?;
    registry.register(Box::new(rejections_total.clone()))?;

    // If any of these fail, metrics were already initialized (idempotent)
    let _ = REGISTRY.set(registry);
    let _ = PROGRESS_REPORTS_TOTAL.set(progress_reports_total);
    let _ = COMPLETIONS_TOTAL.set(completions_total);
    let _ = TEST_ATTEMPTS_TOTAL.set(test_attempts_total);
    let _ = TEST_SCORE.set(test_score);
    let _ = CERTIFICATES_ISSUED_TOTAL.set(certificates_issued_total);
    let _ = REJECTIONS_TOTAL.set(rejections_total);

    tracing::info!("Prometheus metrics initialized successfully");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Returns a comment line instead when the registry is not initialized or
/// encoding fails.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}

/// HTTP handler for the /metrics endpoint.
pub async fn metrics_handler() -> String {
    export_metrics()
}
