//! Test attempts and their graded answers.
//!
//! Attempt numbering and the attempt limit are enforced by one conditional
//! `INSERT ... SELECT`, backed by `UNIQUE (test_id, user_id, attempt_number)`.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::database::{get_u32, Database, DatabaseError};
use crate::model::{TestAnswer, TestAttempt};

const ATTEMPT_COLUMNS: &str = "id, test_id, user_id, attempt_number, score, points_earned, \
                               total_points, passed, time_spent, submitted_at";

/// A graded submission that has not been numbered yet.
#[derive(Debug, Clone)]
pub struct NewAttempt<'a> {
    pub id: &'a str,
    pub test_id: &'a str,
    pub user_id: &'a str,
    pub score: f64,
    pub points_earned: u32,
    pub total_points: u32,
    pub passed: bool,
    pub time_spent: u32,
    pub submitted_at: DateTime<Utc>,
}

impl Database {
    /// Number of attempts the user has submitted for a test.
    pub async fn count_attempts(&self, test_id: &str, user_id: &str) -> Result<u32, DatabaseError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM test_attempts WHERE test_id = ?1 AND user_id = ?2",
        )
        .bind(test_id)
        .bind(user_id)
        .fetch_one(self.pool())
        .await?;
        Ok(count as u32)
    }

    /// Persists an attempt with its answers, numbering it `max + 1`.
    ///
    /// Returns `None` without writing anything when the user already has
    /// `max_attempts` attempts. The limit check and the insert are one
    /// statement, so two racing submissions cannot both take the last slot.
    pub async fn insert_attempt(
        &self,
        attempt: &NewAttempt<'_>,
        answers: &[TestAnswer],
        max_attempts: Option<u32>,
    ) -> Result<Option<TestAttempt>, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO test_attempts ({cols})
            SELECT ?1, ?2, ?3, stats.next_number, ?4, ?5, ?6, ?7, ?8, ?9
            FROM (
                SELECT COALESCE(MAX(attempt_number), 0) + 1 AS next_number,
                       COUNT(*) AS used
                FROM test_attempts
                WHERE test_id = ?2 AND user_id = ?3
            ) AS stats
            WHERE ?10 IS NULL OR stats.used < ?10
            RETURNING {cols}
            "#,
            cols = ATTEMPT_COLUMNS
        ))
        .bind(attempt.id)
        .bind(attempt.test_id)
        .bind(attempt.user_id)
        .bind(attempt.score)
        .bind(i64::from(attempt.points_earned))
        .bind(i64::from(attempt.total_points))
        .bind(attempt.passed)
        .bind(i64::from(attempt.time_spent))
        .bind(attempt.submitted_at)
        .bind(max_attempts.map(i64::from))
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = inserted else {
            tx.rollback().await?;
            return Ok(None);
        };
        let stored = attempt_from_row(&row)?;

        for answer in answers {
            let selected = answer
                .selected_options
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;

            sqlx::query(
                r#"
                INSERT INTO test_answers
                    (attempt_id, question_id, answer_text, selected_options, is_correct, points_earned)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(&stored.id)
            .bind(&answer.question_id)
            .bind(&answer.answer_text)
            .bind(selected)
            .bind(answer.is_correct)
            .bind(i64::from(answer.points_earned))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Transaction(e.to_string()))?;

        tracing::debug!(
            attempt_id = %stored.id,
            attempt_number = stored.attempt_number,
            answers = answers.len(),
            "Stored test attempt"
        );
        Ok(Some(stored))
    }

    /// Attempts of one user for one test, oldest first.
    pub async fn list_attempts(
        &self,
        test_id: &str,
        user_id: &str,
    ) -> Result<Vec<TestAttempt>, DatabaseError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM test_attempts WHERE test_id = ?1 AND user_id = ?2 ORDER BY attempt_number",
            ATTEMPT_COLUMNS
        ))
        .bind(test_id)
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| attempt_from_row(row).map_err(DatabaseError::from))
            .collect()
    }

    pub async fn attempt_answers(&self, attempt_id: &str) -> Result<Vec<TestAnswer>, DatabaseError> {
        let rows = sqlx::query(
            r#"
            SELECT attempt_id, question_id, answer_text, selected_options, is_correct, points_earned
            FROM test_answers WHERE attempt_id = ?1 ORDER BY rowid
            "#,
        )
        .bind(attempt_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(answer_from_row).collect()
    }

    /// Whether any attempt of the user passed the test.
    pub async fn has_passed_attempt(&self, test_id: &str, user_id: &str) -> Result<bool, DatabaseError> {
        let passed: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM test_attempts WHERE test_id = ?1 AND user_id = ?2 AND passed = 1 LIMIT 1",
        )
        .bind(test_id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(passed.is_some())
    }
}

fn attempt_from_row(row: &SqliteRow) -> Result<TestAttempt, sqlx::Error> {
    Ok(TestAttempt {
        id: row.try_get("id")?,
        test_id: row.try_get("test_id")?,
        user_id: row.try_get("user_id")?,
        attempt_number: get_u32(row, "attempt_number")?,
        score: row.try_get("score")?,
        points_earned: get_u32(row, "points_earned")?,
        total_points: get_u32(row, "total_points")?,
        passed: row.try_get("passed")?,
        time_spent: get_u32(row, "time_spent")?,
        submitted_at: row.try_get("submitted_at")?,
    })
}

fn answer_from_row(row: &SqliteRow) -> Result<TestAnswer, DatabaseError> {
    let selected: Option<String> = row.try_get("selected_options")?;
    Ok(TestAnswer {
        attempt_id: row.try_get("attempt_id")?,
        question_id: row.try_get("question_id")?,
        answer_text: row.try_get("answer_text")?,
        selected_options: selected.as_deref().map(serde_json::from_str).transpose()?,
        is_correct: row.try_get("is_correct")?,
        points_earned: get_u32(row, "points_earned")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt<'a>(id: &'a str, passed: bool) -> NewAttempt<'a> {
        NewAttempt {
            id,
            test_id: "t1",
            user_id: "u1",
            score: if passed { 1.0 } else { 0.0 },
            points_earned: if passed { 2 } else { 0 },
            total_points: 2,
            passed,
            time_spent: 30,
            submitted_at: Utc::now(),
        }
    }

    fn answer(question: &str, correct: bool) -> TestAnswer {
        TestAnswer {
            attempt_id: String::new(),
            question_id: question.to_string(),
            answer_text: None,
            selected_options: Some(vec![0, 2]),
            is_correct: correct,
            points_earned: if correct { 1 } else { 0 },
        }
    }

    #[tokio::test]
    async fn test_attempts_are_numbered_sequentially() {
        let db = Database::open_in_memory().await.unwrap();

        let first = db.insert_attempt(&attempt("a1", false), &[], None).await.unwrap().unwrap();
        let second = db.insert_attempt(&attempt("a2", true), &[], None).await.unwrap().unwrap();
        assert_eq!(first.attempt_number, 1);
        assert_eq!(second.attempt_number, 2);
        assert_eq!(db.count_attempts("t1", "u1").await.unwrap(), 2);
        assert!(db.has_passed_attempt("t1", "u1").await.unwrap());

        let listed = db.list_attempts("t1", "u1").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[1].id, "a2");
    }

    #[tokio::test]
    async fn test_attempt_limit_blocks_insert() {
        let db = Database::open_in_memory().await.unwrap();

        assert!(db.insert_attempt(&attempt("a1", false), &[], Some(2)).await.unwrap().is_some());
        assert!(db.insert_attempt(&attempt("a2", false), &[], Some(2)).await.unwrap().is_some());

        let blocked = db
            .insert_attempt(&attempt("a3", false), &[answer("q1", true)], Some(2))
            .await
            .unwrap();
        assert!(blocked.is_none());
        assert_eq!(db.count_attempts("t1", "u1").await.unwrap(), 2);
        assert!(db.attempt_answers("a3").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_answers_are_stored_with_attempt() {
        let db = Database::open_in_memory().await.unwrap();
        let answers = vec![answer("q1", true), answer("q2", false)];

        db.insert_attempt(&attempt("a1", false), &answers, None).await.unwrap();

        let stored = db.attempt_answers("a1").await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].attempt_id, "a1");
        assert_eq!(stored[0].selected_options, Some(vec![0, 2]));
        assert!(!stored[1].is_correct);
    }
}
