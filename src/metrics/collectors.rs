//! High-level recording interface over the raw Prometheus metrics.
//!
//! Recording is a no-op until `init_metrics()` has run, so library users and
//! tests can skip metric setup entirely.

use super::prometheus::{
    CERTIFICATES_ISSUED_TOTAL, COMPLETIONS_TOTAL, PROGRESS_REPORTS_TOTAL, REJECTIONS_TOTAL,
    TEST_ATTEMPTS_TOTAL, TEST_SCORE,
};
use crate::error::ErrorCode;
use crate::model::CompletionLevel;

/// Metrics collector for recording engine events.
///
/// # Example
///
/// ```ignore
/// use lms_progress::metrics::{init_metrics, MetricsCollector};
///
/// init_metrics().expect("Failed to init metrics");
/// let collector = MetricsCollector::new();
/// collector.record_test_attempt(0.75, true);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Record an accepted progress report.
    ///
    /// # Arguments
    ///
    /// * `kind` - "video" or "content"
    pub fn record_progress_report(&self, kind: &str) {
        if let Some(reports) = PROGRESS_REPORTS_TOTAL.get() {
            reports.with_label_values(&[kind]).inc();
        }

        tracing::trace!(kind = kind, "Recorded progress report metric");
    }

    /// Record a newly created completion row.
    pub fn record_completion(&self, level: CompletionLevel) {
        if let Some(completions) = COMPLETIONS_TOTAL.get() {
            completions.with_label_values(&[level.as_str()]).inc();
        }

        tracing::trace!(level = level.as_str(), "Recorded completion metric");
    }

    /// Record a graded test attempt.
    ///
    /// # Arguments
    ///
    /// * `score` - Attempt score between 0.0 and 1.0
    /// * `passed` - Whether the attempt met the passing score
    pub fn record_test_attempt(&self, score: f64, passed: bool) {
        let outcome = if passed { "passed" } else { "failed" };

        if let Some(attempts) = TEST_ATTEMPTS_TOTAL.get() {
            attempts.with_label_values(&[outcome]).inc();
        }

        if let Some(test_score) = TEST_SCORE.get() {
            test_score.observe(score);
        }

        tracing::trace!(score = score, outcome = outcome, "Recorded test attempt metric");
    }

    /// Record an issued certificate or badge.
    ///
    /// # Arguments
    ///
    /// * `level` - Completion level the award belongs to
    /// * `artifact` - "certificate" or "badge"
    pub fn record_award(&self, level: CompletionLevel, artifact: &str) {
        if let Some(issued) = CERTIFICATES_ISSUED_TOTAL.get() {
            issued.with_label_values(&[level.as_str(), artifact]).inc();
        }

        tracing::trace!(level = level.as_str(), artifact = artifact, "Recorded award metric");
    }

    /// Record an operation rejected with a domain error.
    pub fn record_rejection(&self, code: ErrorCode) {
        if let Some(rejections) = REJECTIONS_TOTAL.get() {
            rejections.with_label_values(&[code.as_str()]).inc();
        }

        tracing::trace!(reason = code.as_str(), "Recorded rejection metric");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::init_metrics;

    #[test]
    fn test_recording_without_init_does_not_panic() {
        let collector = MetricsCollector::new();
        collector.record_progress_report("video");
        collector.record_completion(CompletionLevel::Content);
        collector.record_rejection(ErrorCode::Forbidden);
    }

    #[test]
    fn test_recording_after_init() {
        let _ = init_metrics();
        let collector = MetricsCollector::new();

        let before = TEST_ATTEMPTS_TOTAL
            .get()
            .map(|c| c.with_label_values(&["passed"]).get())
            .unwrap_or(0.0);
        collector.record_test_attempt(0.9, true);
        let after = TEST_ATTEMPTS_TOTAL
            .get()
            .map(|c| c.with_label_values(&["passed"]).get())
            .unwrap_or(0.0);

        assert!(after >= before + 1.0);
        collector.record_award(CompletionLevel::Course, "certificate");
    }
}
