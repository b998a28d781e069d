//! Read access to the course catalog and group directory.
//!
//! Courses, content items, learning plans, tests and groups are authored
//! elsewhere. The engine reads them through two traits so the backing store
//! can be swapped:
//!
//! - [`Catalog`]: structure and flags of courses, plans and tests
//! - [`AccessDirectory`]: which groups can see a course and who is in them
//!
//! [`SqliteCatalog`] implements both against the engine's own database, and
//! [`CatalogFixture`] loads a JSON description into it.

pub mod fixture;
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{ContentItem, Course, LearningPlan, Question, Test};
use crate::storage::DatabaseError;

pub use fixture::{CatalogFixture, EnrollmentFixture, FixtureSummary, GroupFixture, TestFixture};
pub use sqlite::SqliteCatalog;

/// Errors raised by catalog backends.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Catalog storage error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Invalid catalog data: {0}")]
    Invalid(String),
}

impl From<sqlx::Error> for CatalogError {
    fn from(err: sqlx::Error) -> Self {
        CatalogError::Database(DatabaseError::from(err))
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        CatalogError::Invalid(err.to_string())
    }
}

/// Course structure as seen by the engine.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn content_item(&self, id: &str) -> Result<Option<ContentItem>, CatalogError>;

    async fn course(&self, id: &str) -> Result<Option<Course>, CatalogError>;

    /// All content items of a course, ascending by `order` (ties by ID).
    async fn course_content(&self, course_id: &str) -> Result<Vec<ContentItem>, CatalogError>;

    async fn learning_plan(&self, id: &str) -> Result<Option<LearningPlan>, CatalogError>;

    /// Plans that include the course.
    async fn plans_containing(&self, course_id: &str) -> Result<Vec<LearningPlan>, CatalogError>;

    async fn test(&self, id: &str) -> Result<Option<Test>, CatalogError>;

    /// The test attached to a TEST content item.
    async fn test_for_content(&self, content_item_id: &str) -> Result<Option<Test>, CatalogError>;

    /// Questions of a test in display order.
    async fn questions(&self, test_id: &str) -> Result<Vec<Question>, CatalogError>;

    /// A stamp that changes whenever the course's flags, items or
    /// prerequisite edges change. `None` when the backend cannot tell, in
    /// which case callers must not cache anything derived from the course.
    async fn course_revision(&self, _course_id: &str) -> Result<Option<i64>, CatalogError> {
        Ok(None)
    }

    /// IDs of the required content items of a course, in order.
    async fn required_content_ids(&self, course_id: &str) -> Result<Vec<String>, CatalogError> {
        Ok(self
            .course_content(course_id)
            .await?
            .into_iter()
            .filter(|item| item.required)
            .map(|item| item.id)
            .collect())
    }
}

/// A group a course has been granted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupGrant {
    pub group_id: String,
    /// Public groups implicitly contain every user.
    pub is_public: bool,
}

/// Group-based visibility of courses.
#[async_trait]
pub trait AccessDirectory: Send + Sync {
    async fn course_groups(&self, course_id: &str) -> Result<Vec<GroupGrant>, CatalogError>;

    async fn is_member(&self, user_id: &str, group_id: &str) -> Result<bool, CatalogError>;
}
