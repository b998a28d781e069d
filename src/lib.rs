//! lms_progress: completion and progress tracking for a learning-management
//! platform.
//!
//! Turns learner activity (video playback, document views, test submissions)
//! into completion records that cascade from content items to courses and
//! learning plans, issuing certificates and badges along the way.

pub mod api;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod model;
pub mod storage;

pub use config::{AppConfig, ConfigError};
pub use engine::Engine;
pub use error::{EngineError, ErrorCode};
