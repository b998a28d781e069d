//! Catalog backed by the catalog tables of the engine database.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{AccessDirectory, Catalog, CatalogError, GroupGrant};
use crate::model::{ContentItem, Course, LearningPlan, Question, QuestionOption, Test};
use crate::storage::database::{opt_u32, parse_enum};
use crate::storage::Database;

const ITEM_COLUMNS: &str =
    "id, course_id, title, content_type, item_order, required, completion_threshold";

const COURSE_COLUMNS: &str =
    "id, title, sequential_required, allow_skipping, certificate_enabled, badge_enabled";

const TEST_COLUMNS: &str =
    "id, content_item_id, passing_score, max_attempts, time_limit, show_correct_answers";

const QUESTION_COLUMNS: &str =
    "id, test_id, question_type, prompt, points, position, options, correct_boolean, acceptable_answers";

/// SQLite-backed [`Catalog`] and [`AccessDirectory`].
#[derive(Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    // =========================================================================
    // Authoring writes
    // =========================================================================

    pub async fn put_course(&self, course: &Course) -> Result<(), CatalogError> {
        sqlx::query(
            r#"
            INSERT INTO courses (id, title, sequential_required, allow_skipping, certificate_enabled, badge_enabled)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                sequential_required = excluded.sequential_required,
                allow_skipping = excluded.allow_skipping,
                certificate_enabled = excluded.certificate_enabled,
                badge_enabled = excluded.badge_enabled
            "#,
        )
        .bind(&course.id)
        .bind(&course.title)
        .bind(course.sequential_required)
        .bind(course.allow_skipping)
        .bind(course.certificate_enabled)
        .bind(course.badge_enabled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn put_content_item(&self, item: &ContentItem) -> Result<(), CatalogError> {
        if !(0.0..=1.0).contains(&item.completion_threshold) {
            return Err(CatalogError::Invalid(format!(
                "completion threshold of '{}' must be within [0, 1]",
                item.id
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO content_items (id, course_id, title, content_type, item_order, required, completion_threshold)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                course_id = excluded.course_id,
                title = excluded.title,
                content_type = excluded.content_type,
                item_order = excluded.item_order,
                required = excluded.required,
                completion_threshold = excluded.completion_threshold
            "#,
        )
        .bind(&item.id)
        .bind(&item.course_id)
        .bind(&item.title)
        .bind(item.content_type.as_str())
        .bind(item.order)
        .bind(item.required)
        .bind(item.completion_threshold)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Stores a plan and replaces its course list.
    pub async fn put_learning_plan(&self, plan: &LearningPlan) -> Result<(), CatalogError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO learning_plans (id, title, certificate_enabled, badge_enabled)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                certificate_enabled = excluded.certificate_enabled,
                badge_enabled = excluded.badge_enabled
            "#,
        )
        .bind(&plan.id)
        .bind(&plan.title)
        .bind(plan.certificate_enabled)
        .bind(plan.badge_enabled)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM learning_plan_courses WHERE learning_plan_id = ?1")
            .bind(&plan.id)
            .execute(&mut *tx)
            .await?;

        for (position, course_id) in plan.course_ids.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO learning_plan_courses (learning_plan_id, course_id, position)
                VALUES (?1, ?2, ?3)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(&plan.id)
            .bind(course_id)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Stores a test and replaces its question bank.
    pub async fn put_test(&self, test: &Test, questions: &[Question]) -> Result<(), CatalogError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO tests (id, content_item_id, passing_score, max_attempts, time_limit, show_correct_answers)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                content_item_id = excluded.content_item_id,
                passing_score = excluded.passing_score,
                max_attempts = excluded.max_attempts,
                time_limit = excluded.time_limit,
                show_correct_answers = excluded.show_correct_answers
            "#,
        )
        .bind(&test.id)
        .bind(&test.content_item_id)
        .bind(test.passing_score)
        .bind(test.max_attempts.map(i64::from))
        .bind(test.time_limit.map(i64::from))
        .bind(test.show_correct_answers)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM questions WHERE test_id = ?1")
            .bind(&test.id)
            .execute(&mut *tx)
            .await?;

        for (idx, question) in questions.iter().enumerate() {
            if question.points == 0 {
                return Err(CatalogError::Invalid(format!(
                    "question '{}' must be worth at least one point",
                    question.id
                )));
            }
            let position = if question.position == 0 {
                idx as i64
            } else {
                i64::from(question.position)
            };

            sqlx::query(
                r#"
                INSERT INTO questions (id, test_id, question_type, prompt, points, position, options, correct_boolean, acceptable_answers)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(&question.id)
            .bind(&test.id)
            .bind(question.question_type.as_str())
            .bind(&question.prompt)
            .bind(i64::from(question.points))
            .bind(position)
            .bind(serde_json::to_string(&question.options)?)
            .bind(question.correct_boolean)
            .bind(serde_json::to_string(&question.acceptable_answers)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn put_group(&self, id: &str, name: &str, is_public: bool) -> Result<(), CatalogError> {
        sqlx::query(
            r#"
            INSERT INTO user_groups (id, name, is_public) VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET name = excluded.name, is_public = excluded.is_public
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(is_public)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn add_group_member(&self, group_id: &str, user_id: &str) -> Result<(), CatalogError> {
        sqlx::query(
            "INSERT INTO group_members (group_id, user_id) VALUES (?1, ?2) ON CONFLICT DO NOTHING",
        )
        .bind(group_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn grant_course_to_group(&self, course_id: &str, group_id: &str) -> Result<(), CatalogError> {
        sqlx::query(
            "INSERT INTO course_group_access (course_id, group_id) VALUES (?1, ?2) ON CONFLICT DO NOTHING",
        )
        .bind(course_id)
        .bind(group_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn plan_course_ids(&self, plan_id: &str) -> Result<Vec<String>, CatalogError> {
        let ids = sqlx::query_scalar(
            "SELECT course_id FROM learning_plan_courses WHERE learning_plan_id = ?1 ORDER BY position",
        )
        .bind(plan_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn plan_from_row(&self, row: &SqliteRow) -> Result<LearningPlan, CatalogError> {
        let id: String = row.try_get("id")?;
        let course_ids = self.plan_course_ids(&id).await?;
        Ok(LearningPlan {
            title: row.try_get("title")?,
            certificate_enabled: row.try_get("certificate_enabled")?,
            badge_enabled: row.try_get("badge_enabled")?,
            course_ids,
            id,
        })
    }
}

#[async_trait]
impl Catalog for SqliteCatalog {
    async fn content_item(&self, id: &str) -> Result<Option<ContentItem>, CatalogError> {
        let row = sqlx::query(&format!("SELECT {} FROM content_items WHERE id = ?1", ITEM_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(item_from_row).transpose()
    }

    async fn course(&self, id: &str) -> Result<Option<Course>, CatalogError> {
        let row = sqlx::query(&format!("SELECT {} FROM courses WHERE id = ?1", COURSE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(course_from_row).transpose()?)
    }

    async fn course_revision(&self, course_id: &str) -> Result<Option<i64>, CatalogError> {
        let revision = sqlx::query_scalar("SELECT revision FROM courses WHERE id = ?1")
            .bind(course_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(revision)
    }

    async fn course_content(&self, course_id: &str) -> Result<Vec<ContentItem>, CatalogError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM content_items WHERE course_id = ?1 ORDER BY item_order, id",
            ITEM_COLUMNS
        ))
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(item_from_row).collect()
    }

    async fn learning_plan(&self, id: &str) -> Result<Option<LearningPlan>, CatalogError> {
        let row = sqlx::query("SELECT id, title, certificate_enabled, badge_enabled FROM learning_plans WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(self.plan_from_row(&row).await?)),
            None => Ok(None),
        }
    }

    async fn plans_containing(&self, course_id: &str) -> Result<Vec<LearningPlan>, CatalogError> {
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.title, p.certificate_enabled, p.badge_enabled
            FROM learning_plans p
            JOIN learning_plan_courses pc ON pc.learning_plan_id = p.id
            WHERE pc.course_id = ?1
            ORDER BY p.id
            "#,
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;

        let mut plans = Vec::with_capacity(rows.len());
        for row in &rows {
            plans.push(self.plan_from_row(row).await?);
        }
        Ok(plans)
    }

    async fn test(&self, id: &str) -> Result<Option<Test>, CatalogError> {
        let row = sqlx::query(&format!("SELECT {} FROM tests WHERE id = ?1", TEST_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(test_from_row).transpose()?)
    }

    async fn test_for_content(&self, content_item_id: &str) -> Result<Option<Test>, CatalogError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM tests WHERE content_item_id = ?1",
            TEST_COLUMNS
        ))
        .bind(content_item_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(test_from_row).transpose()?)
    }

    async fn questions(&self, test_id: &str) -> Result<Vec<Question>, CatalogError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM questions WHERE test_id = ?1 ORDER BY position, id",
            QUESTION_COLUMNS
        ))
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(question_from_row).collect()
    }
}

#[async_trait]
impl AccessDirectory for SqliteCatalog {
    async fn course_groups(&self, course_id: &str) -> Result<Vec<GroupGrant>, CatalogError> {
        let rows = sqlx::query(
            r#"
            SELECT g.id, g.is_public
            FROM course_group_access a
            JOIN user_groups g ON g.id = a.group_id
            WHERE a.course_id = ?1
            ORDER BY g.is_public DESC, g.id
            "#,
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;

        let mut grants = Vec::with_capacity(rows.len());
        for row in &rows {
            grants.push(GroupGrant {
                group_id: row.try_get("id")?,
                is_public: row.try_get("is_public")?,
            });
        }
        Ok(grants)
    }

    async fn is_member(&self, user_id: &str, group_id: &str) -> Result<bool, CatalogError> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM group_members WHERE group_id = ?1 AND user_id = ?2",
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }
}

fn item_from_row(row: &SqliteRow) -> Result<ContentItem, CatalogError> {
    let content_type: String = row.try_get("content_type")?;
    Ok(ContentItem {
        id: row.try_get("id")?,
        course_id: row.try_get("course_id")?,
        title: row.try_get("title")?,
        content_type: parse_enum(&content_type)?,
        order: row.try_get("item_order")?,
        required: row.try_get("required")?,
        completion_threshold: row.try_get("completion_threshold")?,
    })
}

fn course_from_row(row: &SqliteRow) -> Result<Course, sqlx::Error> {
    Ok(Course {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        sequential_required: row.try_get("sequential_required")?,
        allow_skipping: row.try_get("allow_skipping")?,
        certificate_enabled: row.try_get("certificate_enabled")?,
        badge_enabled: row.try_get("badge_enabled")?,
    })
}

fn test_from_row(row: &SqliteRow) -> Result<Test, sqlx::Error> {
    Ok(Test {
        id: row.try_get("id")?,
        content_item_id: row.try_get("content_item_id")?,
        passing_score: row.try_get("passing_score")?,
        max_attempts: opt_u32(row, "max_attempts")?,
        time_limit: opt_u32(row, "time_limit")?,
        show_correct_answers: row.try_get("show_correct_answers")?,
    })
}

fn question_from_row(row: &SqliteRow) -> Result<Question, CatalogError> {
    let question_type: String = row.try_get("question_type")?;
    let options: String = row.try_get("options")?;
    let acceptable: String = row.try_get("acceptable_answers")?;
    Ok(Question {
        id: row.try_get("id")?,
        test_id: row.try_get("test_id")?,
        question_type: parse_enum(&question_type)?,
        prompt: row.try_get("prompt")?,
        points: row.try_get::<i64, _>("points")? as u32,
        position: row.try_get::<i64, _>("position")? as u32,
        options: serde_json::from_str::<Vec<QuestionOption>>(&options)?,
        correct_boolean: row.try_get("correct_boolean")?,
        acceptable_answers: serde_json::from_str(&acceptable)?,
    })
}
