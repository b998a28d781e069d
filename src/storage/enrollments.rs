//! Enrollment rows.
//!
//! Enrollments are created by the enrollment flow; the engine reads them for
//! access checks and advances their status as progress is made.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use super::database::{opt_time, parse_enum, Database, DatabaseError};
use crate::model::{Enrollment, EnrollmentStatus, EnrollmentTarget};

const ENROLLMENT_COLUMNS: &str =
    "id, user_id, course_id, learning_plan_id, status, enrolled_at, completed_at";

fn target_column(target: &EnrollmentTarget) -> (&'static str, &str) {
    match target {
        EnrollmentTarget::Course(id) => ("course_id", id),
        EnrollmentTarget::LearningPlan(id) => ("learning_plan_id", id),
    }
}

impl Database {
    /// Creates the enrollment or overwrites its status.
    pub async fn upsert_enrollment(
        &self,
        user_id: &str,
        target: &EnrollmentTarget,
        status: EnrollmentStatus,
        at: DateTime<Utc>,
    ) -> Result<Enrollment, DatabaseError> {
        let (column, target_id) = target_column(target);
        let completed_at = (status == EnrollmentStatus::Completed).then_some(at);

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO enrollments (id, user_id, {column}, status, enrolled_at, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(user_id, {column}) WHERE {column} IS NOT NULL DO UPDATE SET
                status = excluded.status,
                completed_at = COALESCE(enrollments.completed_at, excluded.completed_at)
            RETURNING {cols}
            "#,
            column = column,
            cols = ENROLLMENT_COLUMNS
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(target_id)
        .bind(status.as_str())
        .bind(at)
        .bind(completed_at)
        .fetch_one(self.pool())
        .await?;

        enrollment_from_row(&row)
    }

    pub async fn enrollment(
        &self,
        user_id: &str,
        target: &EnrollmentTarget,
    ) -> Result<Option<Enrollment>, DatabaseError> {
        let (column, target_id) = target_column(target);
        let row = sqlx::query(&format!(
            "SELECT {} FROM enrollments WHERE user_id = ?1 AND {} = ?2",
            ENROLLMENT_COLUMNS, column
        ))
        .bind(user_id)
        .bind(target_id)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(enrollment_from_row).transpose()
    }

    pub async fn user_enrollments(&self, user_id: &str) -> Result<Vec<Enrollment>, DatabaseError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM enrollments WHERE user_id = ?1 ORDER BY enrolled_at, rowid",
            ENROLLMENT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(enrollment_from_row).collect()
    }

    /// Moves an existing enrollment to `to` when it is currently in one of
    /// `from`. Returns whether a row changed; a missing enrollment is not an
    /// error.
    pub async fn advance_enrollment(
        &self,
        user_id: &str,
        target: &EnrollmentTarget,
        from: &[EnrollmentStatus],
        to: EnrollmentStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        if from.is_empty() {
            return Ok(false);
        }
        let (column, target_id) = target_column(target);
        let completed_at = (to == EnrollmentStatus::Completed).then_some(at);

        let placeholders = (0..from.len())
            .map(|i| format!("?{}", i + 5))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE enrollments SET status = ?3, completed_at = COALESCE(completed_at, ?4) \
             WHERE user_id = ?1 AND {} = ?2 AND status IN ({})",
            column, placeholders
        );

        let mut query = sqlx::query(&sql)
            .bind(user_id)
            .bind(target_id)
            .bind(to.as_str())
            .bind(completed_at);
        for status in from {
            query = query.bind(status.as_str());
        }

        let result = query.execute(self.pool()).await?;
        let changed = result.rows_affected() > 0;
        if changed {
            tracing::debug!(user_id, target = %target, status = %to, "Enrollment advanced");
        }
        Ok(changed)
    }
}

fn enrollment_from_row(row: &SqliteRow) -> Result<Enrollment, DatabaseError> {
    let course_id: Option<String> = row.try_get("course_id")?;
    let plan_id: Option<String> = row.try_get("learning_plan_id")?;
    let target = match (course_id, plan_id) {
        (Some(course), None) => EnrollmentTarget::Course(course),
        (None, Some(plan)) => EnrollmentTarget::LearningPlan(plan),
        _ => {
            return Err(DatabaseError::Corrupt(
                "enrollment must reference exactly one course or plan".to_string(),
            ))
        }
    };
    let status: String = row.try_get("status")?;

    Ok(Enrollment {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        target,
        status: parse_enum(&status)?,
        enrolled_at: row.try_get("enrolled_at")?,
        completed_at: opt_time(row, "completed_at")?,
    })
}
