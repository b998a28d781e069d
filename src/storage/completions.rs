//! Completion records at content, course and plan level.
//!
//! Every insert is `ON CONFLICT DO NOTHING` against the partial unique
//! indexes, so concurrent cascades converge on one row per level and only the
//! writer that actually inserted sees `created == true`.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};
use std::collections::HashSet;
use uuid::Uuid;

use super::database::{opt_time, Database, DatabaseError};
use crate::model::{Completion, CompletionWrite, EnrollmentStatus};

const COMPLETION_COLUMNS: &str = "id, user_id, course_id, content_item_id, learning_plan_id, \
                                  completed_at, certificate_url, certificate_generated_at, \
                                  badge_awarded, badge_awarded_at";

impl Database {
    /// Records that the user completed a content item.
    pub async fn insert_content_completion(
        &self,
        user_id: &str,
        course_id: &str,
        content_item_id: &str,
        at: DateTime<Utc>,
    ) -> Result<CompletionWrite, DatabaseError> {
        let result = sqlx::query(
            r#"
            INSERT INTO completions (id, user_id, course_id, content_item_id, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(course_id)
        .bind(content_item_id)
        .bind(at)
        .execute(self.pool())
        .await?;

        let completion = self
            .content_completion(user_id, course_id, content_item_id)
            .await?
            .ok_or_else(|| {
                DatabaseError::NotFound(format!("content completion {}", content_item_id))
            })?;

        Ok(CompletionWrite {
            completion,
            created: result.rows_affected() == 1,
        })
    }

    pub async fn content_completion(
        &self,
        user_id: &str,
        course_id: &str,
        content_item_id: &str,
    ) -> Result<Option<Completion>, DatabaseError> {
        self.fetch_completion(
            "user_id = ?1 AND course_id = ?2 AND content_item_id = ?3",
            &[user_id, course_id, content_item_id],
        )
        .await
    }

    /// IDs of the content items of a course the user has completed.
    pub async fn completed_content_ids(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<HashSet<String>, DatabaseError> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT content_item_id FROM completions
            WHERE user_id = ?1 AND course_id = ?2 AND content_item_id IS NOT NULL
            "#,
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_all(self.pool())
        .await?;

        Ok(ids.into_iter().collect())
    }

    /// Ensures the course-level completion row exists and the course
    /// enrollment reflects it.
    ///
    /// `advance_from` lists the enrollment states that may move to COMPLETED.
    pub async fn complete_course(
        &self,
        user_id: &str,
        course_id: &str,
        advance_from: &[EnrollmentStatus],
        at: DateTime<Utc>,
    ) -> Result<CompletionWrite, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO completions (id, user_id, course_id, completed_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(course_id)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        complete_enrollment(&mut tx, user_id, "course_id", course_id, advance_from, at).await?;

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Transaction(e.to_string()))?;

        let completion = self
            .course_completion(user_id, course_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("course completion {}", course_id)))?;

        Ok(CompletionWrite {
            completion,
            created: result.rows_affected() == 1,
        })
    }

    pub async fn course_completion(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<Option<Completion>, DatabaseError> {
        self.fetch_completion(
            "user_id = ?1 AND course_id = ?2 AND content_item_id IS NULL AND learning_plan_id IS NULL",
            &[user_id, course_id],
        )
        .await
    }

    /// Course IDs the user has a course-level completion for.
    pub async fn completed_course_ids(&self, user_id: &str) -> Result<HashSet<String>, DatabaseError> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT course_id FROM completions
            WHERE user_id = ?1 AND course_id IS NOT NULL
              AND content_item_id IS NULL AND learning_plan_id IS NULL
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        Ok(ids.into_iter().collect())
    }

    /// Ensures the plan-level completion row exists and the plan enrollment
    /// reflects it.
    pub async fn complete_plan(
        &self,
        user_id: &str,
        plan_id: &str,
        advance_from: &[EnrollmentStatus],
        at: DateTime<Utc>,
    ) -> Result<CompletionWrite, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO completions (id, user_id, learning_plan_id, completed_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(plan_id)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        complete_enrollment(&mut tx, user_id, "learning_plan_id", plan_id, advance_from, at).await?;

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Transaction(e.to_string()))?;

        let completion = self
            .plan_completion(user_id, plan_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("plan completion {}", plan_id)))?;

        Ok(CompletionWrite {
            completion,
            created: result.rows_affected() == 1,
        })
    }

    pub async fn plan_completion(
        &self,
        user_id: &str,
        plan_id: &str,
    ) -> Result<Option<Completion>, DatabaseError> {
        self.fetch_completion("user_id = ?1 AND learning_plan_id = ?2", &[user_id, plan_id])
            .await
    }

    pub async fn get_completion(&self, id: &str) -> Result<Option<Completion>, DatabaseError> {
        self.fetch_completion("id = ?1", &[id]).await
    }

    /// All completion rows of a user, oldest first.
    pub async fn user_completions(&self, user_id: &str) -> Result<Vec<Completion>, DatabaseError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM completions WHERE user_id = ?1 ORDER BY completed_at, rowid",
            COMPLETION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| completion_from_row(row).map_err(DatabaseError::from))
            .collect()
    }

    // =========================================================================
    // Certificates and badges
    // =========================================================================

    /// Claims the right to render a certificate for a completion.
    ///
    /// Only one caller gets `true` while a claim is held. A claim stamped
    /// before `stale_before` counts as abandoned and can be taken over.
    pub async fn claim_certificate(
        &self,
        completion_id: &str,
        at: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE completions SET certificate_generated_at = ?2
            WHERE id = ?1 AND certificate_url IS NULL
              AND (certificate_generated_at IS NULL OR certificate_generated_at < ?3)
            "#,
        )
        .bind(completion_id)
        .bind(at)
        .bind(stale_before)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Stores the rendered URL for the claim stamped `claimed_at`.
    ///
    /// Returns `false` when that claim was taken over or already fulfilled.
    pub async fn store_certificate_url(
        &self,
        completion_id: &str,
        url: &str,
        claimed_at: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE completions SET certificate_url = ?2, certificate_generated_at = ?4
            WHERE id = ?1 AND certificate_url IS NULL AND certificate_generated_at = ?3
            "#,
        )
        .bind(completion_id)
        .bind(url)
        .bind(claimed_at)
        .bind(at)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Drops a claim whose rendering failed so a later cascade can retry.
    pub async fn release_certificate_claim(
        &self,
        completion_id: &str,
        claimed_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            UPDATE completions SET certificate_generated_at = NULL
            WHERE id = ?1 AND certificate_url IS NULL AND certificate_generated_at = ?2
            "#,
        )
        .bind(completion_id)
        .bind(claimed_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Sets the badge flag; `true` only for the write that set it.
    pub async fn award_badge(&self, completion_id: &str, at: DateTime<Utc>) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE completions SET badge_awarded = 1, badge_awarded_at = ?2
            WHERE id = ?1 AND badge_awarded = 0
            "#,
        )
        .bind(completion_id)
        .bind(at)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn fetch_completion(
        &self,
        predicate: &str,
        params: &[&str],
    ) -> Result<Option<Completion>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM completions WHERE {}",
            COMPLETION_COLUMNS, predicate
        );
        let mut query = sqlx::query(&sql);
        for param in params {
            query = query.bind(*param);
        }

        let row = query.fetch_optional(self.pool()).await?;
        Ok(row.as_ref().map(completion_from_row).transpose()?)
    }
}

/// Moves the user's enrollment on `column = target_id` to COMPLETED when it is
/// in one of `advance_from`.
async fn complete_enrollment(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: &str,
    column: &str,
    target_id: &str,
    advance_from: &[EnrollmentStatus],
    at: DateTime<Utc>,
) -> Result<u64, DatabaseError> {
    if advance_from.is_empty() {
        return Ok(0);
    }

    let placeholders = (0..advance_from.len())
        .map(|i| format!("?{}", i + 4))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE enrollments SET status = 'COMPLETED', completed_at = COALESCE(completed_at, ?3) \
         WHERE user_id = ?1 AND {} = ?2 AND status IN ({})",
        column, placeholders
    );

    let mut query = sqlx::query(&sql).bind(user_id).bind(target_id).bind(at);
    for status in advance_from {
        query = query.bind(status.as_str());
    }

    let result = query.execute(&mut **tx).await?;
    if result.rows_affected() > 0 {
        tracing::debug!(user_id, target_id, "Enrollment marked completed");
    }
    Ok(result.rows_affected())
}

fn completion_from_row(row: &SqliteRow) -> Result<Completion, sqlx::Error> {
    Ok(Completion {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        course_id: row.try_get("course_id")?,
        content_item_id: row.try_get("content_item_id")?,
        learning_plan_id: row.try_get("learning_plan_id")?,
        completed_at: row.try_get("completed_at")?,
        certificate_url: row.try_get("certificate_url")?,
        certificate_generated_at: opt_time(row, "certificate_generated_at")?,
        badge_awarded: row.try_get("badge_awarded")?,
        badge_awarded_at: opt_time(row, "badge_awarded_at")?,
    })
}
