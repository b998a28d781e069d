//! Course access evaluation.
//!
//! A user may write progress for a course when any of these hold, checked in
//! this order:
//! 1. a direct course enrollment in an access-granting status
//! 2. an enrollment in a learning plan that contains the course
//! 3. membership in a group the course is granted to
//! 4. the course is granted to a public group

use serde::Serialize;
use std::sync::Arc;

use crate::catalog::{AccessDirectory, Catalog};
use crate::error::EngineError;
use crate::model::EnrollmentTarget;
use crate::storage::Database;

/// How access to a course was granted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "via", rename_all = "camelCase")]
pub enum AccessVia {
    DirectEnrollment,
    #[serde(rename_all = "camelCase")]
    LearningPlan { learning_plan_id: String },
    #[serde(rename_all = "camelCase")]
    Group { group_id: String },
    Public,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessDecision {
    pub course_id: String,
    pub granted: Option<AccessVia>,
}

impl AccessDecision {
    pub fn is_granted(&self) -> bool {
        self.granted.is_some()
    }
}

pub struct AccessEvaluator {
    db: Database,
    catalog: Arc<dyn Catalog>,
    directory: Arc<dyn AccessDirectory>,
}

impl AccessEvaluator {
    pub fn new(db: Database, catalog: Arc<dyn Catalog>, directory: Arc<dyn AccessDirectory>) -> Self {
        Self {
            db,
            catalog,
            directory,
        }
    }

    pub async fn evaluate(&self, user_id: &str, course_id: &str) -> Result<AccessDecision, EngineError> {
        let granted = self.find_grant(user_id, course_id).await?;
        Ok(AccessDecision {
            course_id: course_id.to_string(),
            granted,
        })
    }

    /// Fails with `Forbidden` unless the user may access the course.
    pub async fn require(&self, user_id: &str, course_id: &str) -> Result<AccessVia, EngineError> {
        match self.find_grant(user_id, course_id).await? {
            Some(via) => Ok(via),
            None => {
                tracing::warn!(user_id, course_id, "Access denied");
                Err(EngineError::Forbidden(format!(
                    "User is not enrolled in course '{}'",
                    course_id
                )))
            }
        }
    }

    async fn find_grant(&self, user_id: &str, course_id: &str) -> Result<Option<AccessVia>, EngineError> {
        let direct = self
            .db
            .enrollment(user_id, &EnrollmentTarget::Course(course_id.to_string()))
            .await?;
        if direct.is_some_and(|e| e.status.grants_access()) {
            return Ok(Some(AccessVia::DirectEnrollment));
        }

        for plan in self.catalog.plans_containing(course_id).await? {
            let enrollment = self
                .db
                .enrollment(user_id, &EnrollmentTarget::LearningPlan(plan.id.clone()))
                .await?;
            if enrollment.is_some_and(|e| e.status.grants_access()) {
                return Ok(Some(AccessVia::LearningPlan {
                    learning_plan_id: plan.id,
                }));
            }
        }

        let grants = self.directory.course_groups(course_id).await?;
        for grant in grants.iter().filter(|g| !g.is_public) {
            if self.directory.is_member(user_id, &grant.group_id).await? {
                return Ok(Some(AccessVia::Group {
                    group_id: grant.group_id.clone(),
                }));
            }
        }
        if grants.iter().any(|g| g.is_public) {
            return Ok(Some(AccessVia::Public));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SqliteCatalog;
    use crate::model::{Course, EnrollmentStatus, LearningPlan};
    use chrono::Utc;

    async fn setup() -> (Database, SqliteCatalog, AccessEvaluator) {
        let db = Database::open_in_memory().await.unwrap();
        let catalog = SqliteCatalog::new(&db);
        catalog.put_course(&Course::new("c1")).await.unwrap();
        let shared = Arc::new(catalog.clone());
        let evaluator = AccessEvaluator::new(db.clone(), shared.clone(), shared);
        (db, catalog, evaluator)
    }

    #[tokio::test]
    async fn test_no_grant_is_forbidden() {
        let (_db, _catalog, evaluator) = setup().await;
        let err = evaluator.require("u1", "c1").await.unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::Forbidden);
        assert!(!evaluator.evaluate("u1", "c1").await.unwrap().is_granted());
    }

    #[tokio::test]
    async fn test_direct_enrollment_status_matters() {
        let (db, _catalog, evaluator) = setup().await;
        let target = EnrollmentTarget::Course("c1".into());

        db.upsert_enrollment("u1", &target, EnrollmentStatus::PendingApproval, Utc::now())
            .await
            .unwrap();
        assert!(evaluator.require("u1", "c1").await.is_err());

        db.upsert_enrollment("u1", &target, EnrollmentStatus::InProgress, Utc::now())
            .await
            .unwrap();
        assert_eq!(
            evaluator.require("u1", "c1").await.unwrap(),
            AccessVia::DirectEnrollment
        );
    }

    #[tokio::test]
    async fn test_plan_group_and_public_paths() {
        let (db, catalog, evaluator) = setup().await;
        catalog
            .put_learning_plan(&LearningPlan::new("p1", vec!["c1".into()]))
            .await
            .unwrap();
        db.upsert_enrollment(
            "planner",
            &EnrollmentTarget::LearningPlan("p1".into()),
            EnrollmentStatus::Enrolled,
            Utc::now(),
        )
        .await
        .unwrap();
        assert_eq!(
            evaluator.require("planner", "c1").await.unwrap(),
            AccessVia::LearningPlan {
                learning_plan_id: "p1".into()
            }
        );

        catalog.put_group("staff", "Staff", false).await.unwrap();
        catalog.add_group_member("staff", "member").await.unwrap();
        catalog.grant_course_to_group("c1", "staff").await.unwrap();
        assert_eq!(
            evaluator.require("member", "c1").await.unwrap(),
            AccessVia::Group {
                group_id: "staff".into()
            }
        );
        assert!(evaluator.require("stranger", "c1").await.is_err());

        db.bootstrap_public_group("public", "Everyone").await.unwrap();
        catalog.grant_course_to_group("c1", "public").await.unwrap();
        assert_eq!(
            evaluator.require("stranger", "c1").await.unwrap(),
            AccessVia::Public
        );
    }
}
