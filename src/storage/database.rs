//! SQLite database client for progress, attempt and completion storage.
//!
//! Writes that must not interleave are expressed as single conditional
//! statements (`ON CONFLICT`, `INSERT ... SELECT ... WHERE`) or as
//! transactions whose first statement is a write, so SQLite takes the write
//! lock before anything is read.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use super::migrations::{MigrationError, MigrationRunner};
use super::schema;

/// Errors that can occur during database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Connection to the database failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),

    /// Record not found.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// A stored value could not be mapped back to a domain type.
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// SQLite database client.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connects to the database and returns a new client.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite://lms_progress.db")
    /// * `max_connections` - Upper bound of the connection pool
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, DatabaseError> {
        let opts = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(opts)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        tracing::info!(url = database_url, max_connections, "Database connected");
        Ok(Self { pool })
    }

    /// Opens (creating if needed) a database file and applies the schema.
    pub async fn open(path: &Path) -> Result<Self, DatabaseError> {
        let db = Self::connect(&format!("sqlite://{}", path.display()), 8).await?;
        db.run_migrations().await?;
        Ok(db)
    }

    /// Opens a private in-memory database with the schema applied.
    ///
    /// Limited to one connection, since every SQLite memory connection is its
    /// own database.
    pub async fn open_in_memory() -> Result<Self, DatabaseError> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Creates a new database client from an existing pool.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Runs database migrations.
    pub async fn run_migrations(&self) -> Result<usize, DatabaseError> {
        let runner = MigrationRunner::new(self.pool.clone());
        Ok(runner.run_migrations().await?)
    }

    /// Creates the public group once.
    ///
    /// Runs at start-up only; the access path never creates it.
    pub async fn bootstrap_public_group(&self, id: &str, name: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "INSERT INTO user_groups (id, name, is_public) VALUES (?1, ?2, 1)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(id)
        .bind(name)
        .execute(&self.pool)
        .await?;

        let created = result.rows_affected() == 1;
        if !created {
            sqlx::query("UPDATE user_groups SET is_public = 1 WHERE id = ?1")
                .bind(id)
                .execute(&self.pool)
                .await?;
        }
        tracing::info!(group_id = id, created, "Public group bootstrapped");
        Ok(created)
    }

    /// Row counts per table.
    pub async fn stats(&self) -> Result<DbStats, DatabaseError> {
        let mut tables = Vec::with_capacity(schema::ALL_TABLES.len());
        for table in schema::ALL_TABLES.iter().rev() {
            let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&self.pool)
                .await?;
            tables.push(TableCount {
                table: table.to_string(),
                rows: count as u64,
            });
        }
        Ok(DbStats { tables })
    }
}

/// Row count of one table.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TableCount {
    pub table: String,
    pub rows: u64,
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub tables: Vec<TableCount>,
}

impl DbStats {
    pub fn rows(&self, table: &str) -> u64 {
        self.tables
            .iter()
            .find(|t| t.table == table)
            .map(|t| t.rows)
            .unwrap_or(0)
    }
}

// =========================================================================
// Row helpers shared by the per-table modules
// =========================================================================

pub(crate) fn opt_u32(row: &SqliteRow, column: &str) -> Result<Option<u32>, sqlx::Error> {
    Ok(row.try_get::<Option<i64>, _>(column)?.map(|v| v as u32))
}

pub(crate) fn get_u32(row: &SqliteRow, column: &str) -> Result<u32, sqlx::Error> {
    Ok(row.try_get::<i64, _>(column)? as u32)
}

pub(crate) fn opt_time(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    row.try_get::<Option<DateTime<Utc>>, _>(column)
}

pub(crate) fn parse_enum<T: FromStr<Err = String>>(value: &str) -> Result<T, DatabaseError> {
    value.parse::<T>().map_err(DatabaseError::Corrupt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory_applies_schema() {
        let db = Database::open_in_memory().await.unwrap();
        let stats = db.stats().await.unwrap();
        assert_eq!(stats.tables.len(), schema::ALL_TABLES.len());
        assert_eq!(stats.rows("completions"), 0);
    }

    #[tokio::test]
    async fn test_open_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.db")).await.unwrap();
        assert_eq!(db.stats().await.unwrap().rows("enrollments"), 0);

        // Re-opening the same file keeps the schema and applies nothing new.
        let again = Database::open(&dir.path().join("test.db")).await.unwrap();
        assert_eq!(again.run_migrations().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bootstrap_public_group_is_idempotent() {
        let db = Database::open_in_memory().await.unwrap();
        db.bootstrap_public_group("public", "Everyone").await.unwrap();
        db.bootstrap_public_group("public", "Everyone").await.unwrap();

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM user_groups WHERE id = 'public' AND is_public = 1")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(count, 1);
    }
}
