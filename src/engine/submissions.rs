//! Test submission flow: limit check, grading, persistence, cascade.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::access::AccessEvaluator;
use super::aggregator::{CascadeReport, CompletionAggregator};
use super::grader::grade_attempt;
use super::lifecycle::EnrollmentLifecycle;
use crate::catalog::Catalog;
use crate::error::{EngineError, ValidationErrors};
use crate::metrics::MetricsCollector;
use crate::model::{
    ContentCompletedEvent, EnrollmentStatus, EnrollmentTarget, Question, QuestionType,
    SubmittedAnswer, Test, TestAnswer, TestAttempt,
};
use crate::storage::{Database, NewAttempt};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSubmissionRequest {
    pub test_id: String,
    #[serde(default)]
    pub answers: Vec<SubmittedAnswer>,
    /// Seconds.
    #[serde(default)]
    pub time_spent: u32,
}

/// The answer key of a question, revealed only for tests that allow it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerKey {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_options: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceptable_answers: Option<Vec<String>>,
}

impl AnswerKey {
    fn for_question(question: &Question) -> Self {
        let mut key = AnswerKey {
            correct_options: None,
            correct_answer: None,
            acceptable_answers: None,
        };
        match question.question_type {
            QuestionType::SingleChoice | QuestionType::MultipleChoice => {
                key.correct_options = Some(question.correct_option_indices());
            }
            QuestionType::TrueFalse => key.correct_answer = question.correct_boolean,
            QuestionType::ShortAnswer | QuestionType::FillBlank => {
                key.acceptable_answers = Some(question.acceptable_answers.clone());
            }
        }
        key
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerFeedback {
    #[serde(flatten)]
    pub answer: TestAnswer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_key: Option<AnswerKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSubmissionResult {
    pub attempt: TestAttempt,
    pub answers: Vec<AnswerFeedback>,
    pub can_retake: bool,
    pub max_attempts: Option<u32>,
    pub remaining_attempts: Option<u32>,
    #[serde(skip_serializing_if = "CascadeReport::is_empty")]
    pub cascade: CascadeReport,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub attempt: TestAttempt,
    pub answers: Vec<AnswerFeedback>,
}

pub struct TestSubmissions {
    db: Database,
    catalog: Arc<dyn Catalog>,
    access: Arc<AccessEvaluator>,
    aggregator: Arc<CompletionAggregator>,
    lifecycle: Arc<EnrollmentLifecycle>,
    metrics: MetricsCollector,
}

impl TestSubmissions {
    pub fn new(
        db: Database,
        catalog: Arc<dyn Catalog>,
        access: Arc<AccessEvaluator>,
        aggregator: Arc<CompletionAggregator>,
        lifecycle: Arc<EnrollmentLifecycle>,
    ) -> Self {
        Self {
            db,
            catalog,
            access,
            aggregator,
            lifecycle,
            metrics: MetricsCollector::new(),
        }
    }

    /// Grades and stores one submission.
    ///
    /// Every precondition (test exists, access, attempt limit) is checked
    /// before grading. The limit is enforced again by the insert itself, so a
    /// concurrent submission taking the last slot still yields `Forbidden`.
    pub async fn submit(&self, user_id: &str, request: &TestSubmissionRequest) -> Result<TestSubmissionResult, EngineError> {
        validate_request(request)?;

        let test = self
            .catalog
            .test(&request.test_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Test", &request.test_id))?;
        let item = self
            .catalog
            .content_item(&test.content_item_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Content item", &test.content_item_id))?;
        self.access.require(user_id, &item.course_id).await?;

        let used = self.db.count_attempts(&test.id, user_id).await?;
        if test.remaining_attempts(used) == Some(0) {
            return Err(attempt_limit_reached(user_id, &test));
        }

        let questions = self.catalog.questions(&test.id).await?;
        let graded = grade_attempt(&test, &questions, &request.answers);

        let attempt_id = Uuid::new_v4().to_string();
        let new_attempt = NewAttempt {
            id: &attempt_id,
            test_id: &test.id,
            user_id,
            score: graded.score,
            points_earned: graded.points_earned,
            total_points: graded.total_points,
            passed: graded.passed,
            time_spent: request.time_spent,
            submitted_at: Utc::now(),
        };
        let attempt = self
            .db
            .insert_attempt(&new_attempt, &graded.answers, test.max_attempts)
            .await?
            .ok_or_else(|| attempt_limit_reached(user_id, &test))?;

        self.metrics.record_test_attempt(attempt.score, attempt.passed);
        tracing::info!(
            user_id,
            test_id = %test.id,
            attempt_number = attempt.attempt_number,
            score = attempt.score,
            passed = attempt.passed,
            "Test attempt graded"
        );

        self.lifecycle
            .advance(
                &self.db,
                user_id,
                &EnrollmentTarget::Course(item.course_id.clone()),
                EnrollmentStatus::InProgress,
                Utc::now(),
            )
            .await?;

        let cascade = if attempt.passed {
            self.aggregator
                .dispatch(ContentCompletedEvent::new(user_id, &item.course_id, &item.id))
                .await?
        } else {
            CascadeReport::default()
        };

        // Attempts are never deleted, so the number equals the count used.
        let remaining = test.remaining_attempts(attempt.attempt_number);
        let answers = with_feedback(&test, &questions, graded.answers.into_iter().map(|mut a| {
            a.attempt_id = attempt.id.clone();
            a
        }));

        Ok(TestSubmissionResult {
            attempt,
            answers,
            can_retake: remaining != Some(0),
            max_attempts: test.max_attempts,
            remaining_attempts: remaining,
            cascade,
        })
    }

    /// The caller's attempts for a test, oldest first.
    pub async fn attempts(&self, user_id: &str, test_id: &str) -> Result<Vec<AttemptRecord>, EngineError> {
        let test = self
            .catalog
            .test(test_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Test", test_id))?;
        let questions = self.catalog.questions(test_id).await?;

        let mut records = Vec::new();
        for attempt in self.db.list_attempts(test_id, user_id).await? {
            let answers = self.db.attempt_answers(&attempt.id).await?;
            records.push(AttemptRecord {
                answers: with_feedback(&test, &questions, answers),
                attempt,
            });
        }
        Ok(records)
    }
}

fn validate_request(request: &TestSubmissionRequest) -> Result<(), EngineError> {
    let mut errors = ValidationErrors::new();
    if request.test_id.trim().is_empty() {
        errors.add("testId", "is required");
    }
    if request.answers.iter().any(|a| a.question_id.trim().is_empty()) {
        errors.add("answers", "every answer needs a questionId");
    }
    errors.into_result()
}

fn attempt_limit_reached(user_id: &str, test: &Test) -> EngineError {
    let max = test.max_attempts.unwrap_or_default();
    tracing::warn!(user_id, test_id = %test.id, max_attempts = max, "Attempt limit reached");
    EngineError::Forbidden(format!(
        "Maximum attempts ({}) reached for test '{}'",
        max, test.id
    ))
}

fn with_feedback(
    test: &Test,
    questions: &[Question],
    answers: impl IntoIterator<Item = TestAnswer>,
) -> Vec<AnswerFeedback> {
    let keys: HashMap<&str, &Question> = if test.show_correct_answers {
        questions.iter().map(|q| (q.id.as_str(), q)).collect()
    } else {
        HashMap::new()
    };

    answers
        .into_iter()
        .map(|answer| AnswerFeedback {
            answer_key: keys.get(answer.question_id.as_str()).map(|q| AnswerKey::for_question(q)),
            answer,
        })
        .collect()
}
