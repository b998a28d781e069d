//! Command-line interface for lms-progress.
//!
//! Provides commands to serve the API, migrate and bootstrap the database,
//! load a catalog fixture and inspect table statistics.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
