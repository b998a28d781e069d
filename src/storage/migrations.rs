//! Versioned schema migrations.
//!
//! Each entry of [`schema::MIGRATIONS`] runs once, inside a transaction that
//! also records its name in `_migrations`.

use chrono::Utc;
use sqlx::SqlitePool;
use thiserror::Error;

use super::schema::{self, Migration};

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration {name} failed: {message}")]
    MigrationFailed { name: String, message: String },
}

pub struct MigrationRunner {
    pool: SqlitePool,
}

impl MigrationRunner {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Applies every migration not yet recorded; returns how many ran.
    pub async fn run_migrations(&self) -> Result<usize, MigrationError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                name       TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        let applied: Vec<String> = sqlx::query_scalar("SELECT name FROM _migrations")
            .fetch_all(&self.pool)
            .await?;

        let mut count = 0;
        for migration in schema::MIGRATIONS {
            if applied.iter().any(|name| name == migration.name) {
                continue;
            }
            if self.apply(migration).await? {
                tracing::info!(migration = migration.name, "Applied migration");
                count += 1;
            }
        }
        Ok(count)
    }

    /// `false` when another runner recorded the migration first.
    async fn apply(&self, migration: &Migration) -> Result<bool, MigrationError> {
        let mut tx = self.pool.begin().await?;

        // Claim the name first so a concurrent runner blocks here.
        let claimed = sqlx::query(
            "INSERT INTO _migrations (name, applied_at) VALUES (?1, ?2) ON CONFLICT(name) DO NOTHING",
        )
        .bind(migration.name)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;
        if !claimed {
            tx.rollback().await?;
            return Ok(false);
        }

        for statement in migration.statements {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| MigrationError::MigrationFailed {
                    name: migration.name.to_string(),
                    message: e.to_string(),
                })?;
        }

        tx.commit().await?;
        Ok(true)
    }

    /// Applied migration names, oldest first.
    pub async fn applied_migrations(&self) -> Result<Vec<AppliedMigration>, MigrationError> {
        let rows = sqlx::query_as("SELECT name, applied_at FROM _migrations ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AppliedMigration {
    pub name: String,
    /// RFC 3339.
    pub applied_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_migrations_run_once() {
        let runner = MigrationRunner::new(memory_pool().await);

        let first = runner.run_migrations().await.unwrap();
        assert_eq!(first, schema::MIGRATIONS.len());
        assert_eq!(runner.run_migrations().await.unwrap(), 0);

        let applied = runner.applied_migrations().await.unwrap();
        assert_eq!(applied.len(), first);
        assert_eq!(applied[0].name, "0001_catalog");
    }

    #[test]
    fn test_failure_names_the_migration() {
        let err = MigrationError::MigrationFailed {
            name: "0002_progress".to_string(),
            message: "syntax error".to_string(),
        };
        assert_eq!(err.to_string(), "Migration 0002_progress failed: syntax error");
    }
}
