//! Metrics module for Prometheus-based monitoring.
//!
//! Counts progress reports, completions per level, graded attempts, issued
//! awards and rejected operations.
//!
//! # Example
//!
//! ```ignore
//! use lms_progress::metrics::{init_metrics, export_metrics, MetricsCollector};
//!
//! init_metrics().expect("Failed to initialize metrics");
//!
//! let collector = MetricsCollector::new();
//! collector.record_progress_report("video");
//!
//! let metrics_text = export_metrics();
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::MetricsCollector;
pub use prometheus::{export_metrics, init_metrics, metrics_handler};

pub use prometheus::{
    CERTIFICATES_ISSUED_TOTAL, COMPLETIONS_TOTAL, PROGRESS_REPORTS_TOTAL, REGISTRY,
    REJECTIONS_TOTAL, TEST_ATTEMPTS_TOTAL, TEST_SCORE,
};
