//! The progress and completion engine.
//!
//! Writes enter through [`ProgressRecorder`] (video and document reports) or
//! [`TestSubmissions`] (graded attempts). Both feed content completions into
//! the [`CompletionAggregator`], which cascades them to course and plan level
//! and hands finished units to the [`CertificationIssuer`]. The
//! [`PrerequisiteGate`] answers unlock queries and owns prerequisite edits.
//!
//! [`Engine`] wires the components over one database and catalog.

pub mod access;
pub mod aggregator;
pub mod certification;
pub mod gate;
pub mod grader;
pub mod graph;
pub mod lifecycle;
pub mod recorder;
pub mod submissions;

pub use access::{AccessDecision, AccessEvaluator, AccessVia};
pub use aggregator::{CascadeReport, CompletionAggregator, CourseProgressSummary};
pub use certification::{
    CertificateRenderer, CertificationIssuer, IssuedAwards, RenderError, UrlCertificateRenderer,
};
pub use gate::PrerequisiteGate;
pub use grader::{grade_attempt, GradedAttempt};
pub use graph::{CourseGraph, GraphNode, SequencePolicy};
pub use lifecycle::EnrollmentLifecycle;
pub use recorder::{ProgressRecorder, ProgressResult};
pub use submissions::{
    AnswerFeedback, AnswerKey, AttemptRecord, TestSubmissionRequest, TestSubmissionResult,
    TestSubmissions,
};

use std::sync::Arc;

use crate::catalog::{AccessDirectory, Catalog, SqliteCatalog};
use crate::error::EngineError;
use crate::model::Completion;
use crate::storage::Database;

/// All engine components sharing one database and catalog.
#[derive(Clone)]
pub struct Engine {
    pub db: Database,
    pub catalog: Arc<dyn Catalog>,
    pub access: Arc<AccessEvaluator>,
    pub gate: Arc<PrerequisiteGate>,
    pub aggregator: Arc<CompletionAggregator>,
    pub recorder: Arc<ProgressRecorder>,
    pub submissions: Arc<TestSubmissions>,
}

impl Engine {
    pub fn new(
        db: Database,
        catalog: Arc<dyn Catalog>,
        directory: Arc<dyn AccessDirectory>,
        renderer: Arc<dyn CertificateRenderer>,
    ) -> Self {
        let lifecycle = Arc::new(EnrollmentLifecycle::new());
        let access = Arc::new(AccessEvaluator::new(db.clone(), catalog.clone(), directory));
        let gate = Arc::new(PrerequisiteGate::new(db.clone(), catalog.clone()));
        let issuer = Arc::new(CertificationIssuer::new(db.clone(), renderer));
        let aggregator = Arc::new(CompletionAggregator::new(
            db.clone(),
            catalog.clone(),
            issuer,
            lifecycle.clone(),
        ));
        let recorder = Arc::new(ProgressRecorder::new(
            db.clone(),
            catalog.clone(),
            access.clone(),
            gate.clone(),
            aggregator.clone(),
            lifecycle.clone(),
        ));
        let submissions = Arc::new(TestSubmissions::new(
            db.clone(),
            catalog.clone(),
            access.clone(),
            aggregator.clone(),
            lifecycle,
        ));

        Self {
            db,
            catalog,
            access,
            gate,
            aggregator,
            recorder,
            submissions,
        }
    }

    /// Engine backed by the catalog tables of `db` itself.
    pub fn with_sqlite_catalog(db: Database, renderer: Arc<dyn CertificateRenderer>) -> Self {
        let catalog = Arc::new(SqliteCatalog::new(&db));
        Self::new(db, catalog.clone(), catalog, renderer)
    }

    pub async fn course_progress(&self, user_id: &str, course_id: &str) -> Result<CourseProgressSummary, EngineError> {
        self.aggregator.course_progress(user_id, course_id).await
    }

    /// Re-runs the course cascade for a user with access to the course.
    pub async fn recompute_course(&self, user_id: &str, course_id: &str) -> Result<CascadeReport, EngineError> {
        if self.catalog.course(course_id).await?.is_none() {
            return Err(EngineError::not_found("Course", course_id));
        }
        self.access.require(user_id, course_id).await?;
        self.aggregator.recompute_course(user_id, course_id).await
    }

    pub async fn completions(&self, user_id: &str) -> Result<Vec<Completion>, EngineError> {
        Ok(self.db.user_completions(user_id).await?)
    }

    pub async fn completion(&self, completion_id: &str) -> Result<Completion, EngineError> {
        self.db
            .get_completion(completion_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Completion", completion_id))
    }
}
