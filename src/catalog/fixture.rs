//! JSON catalog fixtures.
//!
//! Loads courses, content, plans, tests, groups and enrollments from one JSON
//! document. Used by the `catalog load` command and by tests.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{CatalogError, SqliteCatalog};
use crate::model::{ContentItem, Course, EnrollmentStatus, EnrollmentTarget, LearningPlan, Question, Test};
use crate::storage::Database;

/// A test with its question bank.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestFixture {
    #[serde(flatten)]
    pub test: Test,
    #[serde(default)]
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupFixture {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub members: Vec<String>,
    /// Courses granted to the group.
    #[serde(default)]
    pub course_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentFixture {
    pub user_id: String,
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde(default)]
    pub learning_plan_id: Option<String>,
    #[serde(default = "default_status")]
    pub status: EnrollmentStatus,
}

fn default_status() -> EnrollmentStatus {
    EnrollmentStatus::Enrolled
}

impl EnrollmentFixture {
    fn target(&self) -> Result<EnrollmentTarget, CatalogError> {
        match (&self.course_id, &self.learning_plan_id) {
            (Some(course), None) => Ok(EnrollmentTarget::Course(course.clone())),
            (None, Some(plan)) => Ok(EnrollmentTarget::LearningPlan(plan.clone())),
            _ => Err(CatalogError::Invalid(format!(
                "enrollment of '{}' must name exactly one of courseId / learningPlanId",
                self.user_id
            ))),
        }
    }
}

/// Everything a catalog JSON file may contain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogFixture {
    #[serde(default)]
    pub courses: Vec<Course>,
    #[serde(default)]
    pub content_items: Vec<ContentItem>,
    #[serde(default)]
    pub learning_plans: Vec<LearningPlan>,
    #[serde(default)]
    pub tests: Vec<TestFixture>,
    #[serde(default)]
    pub groups: Vec<GroupFixture>,
    #[serde(default)]
    pub enrollments: Vec<EnrollmentFixture>,
}

/// Counts of what a fixture load wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureSummary {
    pub courses: usize,
    pub content_items: usize,
    pub learning_plans: usize,
    pub tests: usize,
    pub questions: usize,
    pub groups: usize,
    pub enrollments: usize,
}

impl CatalogFixture {
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        Ok(serde_json::from_str(json)?)
    }

    pub async fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            CatalogError::Invalid(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    /// Writes the fixture in dependency order.
    pub async fn load(
        &self,
        catalog: &SqliteCatalog,
        db: &Database,
    ) -> Result<FixtureSummary, CatalogError> {
        let mut summary = FixtureSummary::default();

        for course in &self.courses {
            catalog.put_course(course).await?;
            summary.courses += 1;
        }
        for item in &self.content_items {
            catalog.put_content_item(item).await?;
            summary.content_items += 1;
        }
        for plan in &self.learning_plans {
            catalog.put_learning_plan(plan).await?;
            summary.learning_plans += 1;
        }
        for fixture in &self.tests {
            let questions: Vec<Question> = fixture
                .questions
                .iter()
                .cloned()
                .map(|mut q| {
                    q.test_id = fixture.test.id.clone();
                    q
                })
                .collect();
            catalog.put_test(&fixture.test, &questions).await?;
            summary.tests += 1;
            summary.questions += questions.len();
        }
        for group in &self.groups {
            let name = if group.name.is_empty() { &group.id } else { &group.name };
            catalog.put_group(&group.id, name, group.is_public).await?;
            for member in &group.members {
                catalog.add_group_member(&group.id, member).await?;
            }
            for course_id in &group.course_ids {
                catalog.grant_course_to_group(course_id, &group.id).await?;
            }
            summary.groups += 1;
        }
        for enrollment in &self.enrollments {
            let target = enrollment.target()?;
            db.upsert_enrollment(&enrollment.user_id, &target, enrollment.status, Utc::now())
                .await?;
            summary.enrollments += 1;
        }

        tracing::info!(
            courses = summary.courses,
            content_items = summary.content_items,
            tests = summary.tests,
            enrollments = summary.enrollments,
            "Catalog fixture loaded"
        );
        Ok(summary)
    }
}
