//! SQLite persistent storage.
//!
//! This module owns the tables the engine writes: progress rows, test
//! attempts, completions, enrollments and prerequisite edges. Catalog tables
//! live in the same database but are read through [`crate::catalog`].
//!
//! # Overview
//!
//! - **Database**: pooled SQLite client, one `impl` block per table family
//! - **Migrations**: schema management and versioning
//! - **Schema**: `CREATE TABLE` / index statements
//!
//! # Usage
//!
//! ```rust,ignore
//! use lms_progress::storage::Database;
//!
//! let db = Database::connect("sqlite://lms_progress.db", 8).await?;
//! db.run_migrations().await?;
//!
//! let done = db.completed_content_ids("user-1", "course-1").await?;
//! ```

pub mod attempts;
pub mod completions;
pub mod database;
pub mod enrollments;
pub mod migrations;
pub mod prerequisites;
pub mod progress;
pub mod schema;

// Re-export main types for convenience
pub use attempts::NewAttempt;
pub use database::{Database, DatabaseError, DbStats, TableCount};
pub use migrations::{AppliedMigration, MigrationError, MigrationRunner};
pub use prerequisites::PrerequisiteEdge;
pub use progress::{ContentProgressUpsert, VideoProgressUpsert};
