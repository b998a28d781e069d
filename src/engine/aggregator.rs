//! The completion cascade: content → course → learning plan.
//!
//! Events are processed from a FIFO queue. Handling a
//! [`ContentCompletedEvent`] may enqueue a [`CourseCompletedEvent`], which in
//! turn re-evaluates every plan the user is enrolled in that contains the
//! course. Every write is create-if-absent, so re-delivering any event, or
//! re-running a cascade that failed halfway, converges on the same rows.

use chrono::Utc;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;

use super::certification::{CertificationIssuer, IssuedAwards};
use super::lifecycle::EnrollmentLifecycle;
use crate::catalog::Catalog;
use crate::error::EngineError;
use crate::metrics::MetricsCollector;
use crate::model::{
    AwardFlags, Completion, CompletionEvent, CompletionLevel, ContentCompletedEvent, ContentType,
    Course, CourseCompletedEvent, EnrollmentStatus, EnrollmentTarget, LearningPlan,
};
use crate::storage::Database;

/// What a cascade newly created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeReport {
    /// Content items that received their completion row.
    pub content_completed: Vec<String>,
    pub courses_completed: Vec<String>,
    pub plans_completed: Vec<String>,
    pub awards: Vec<IssuedAwards>,
}

impl CascadeReport {
    pub fn is_empty(&self) -> bool {
        self.content_completed.is_empty()
            && self.courses_completed.is_empty()
            && self.plans_completed.is_empty()
            && self.awards.is_empty()
    }
}

/// Completion state of one course for one user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseProgressSummary {
    pub course_id: String,
    pub required_items: usize,
    pub completed_required_items: usize,
    /// Completed items including optional ones.
    pub completed_items: usize,
    pub percentage: f64,
    pub completed: bool,
    pub completion: Option<Completion>,
}

pub struct CompletionAggregator {
    db: Database,
    catalog: Arc<dyn Catalog>,
    issuer: Arc<CertificationIssuer>,
    lifecycle: Arc<EnrollmentLifecycle>,
    metrics: MetricsCollector,
}

impl CompletionAggregator {
    pub fn new(
        db: Database,
        catalog: Arc<dyn Catalog>,
        issuer: Arc<CertificationIssuer>,
        lifecycle: Arc<EnrollmentLifecycle>,
    ) -> Self {
        Self {
            db,
            catalog,
            issuer,
            lifecycle,
            metrics: MetricsCollector::new(),
        }
    }

    /// Runs an event and everything it triggers to completion.
    pub async fn dispatch(&self, event: impl Into<CompletionEvent>) -> Result<CascadeReport, EngineError> {
        let mut queue = VecDeque::from([event.into()]);
        let mut report = CascadeReport::default();

        while let Some(event) = queue.pop_front() {
            let follow_ups = match &event {
                CompletionEvent::ContentCompleted(e) => self.on_content_completed(e, &mut report).await?,
                CompletionEvent::CourseCompleted(e) => self.on_course_completed(e, &mut report).await?,
            };
            queue.extend(follow_ups);
        }

        Ok(report)
    }

    async fn on_content_completed(
        &self,
        event: &ContentCompletedEvent,
        report: &mut CascadeReport,
    ) -> Result<Vec<CompletionEvent>, EngineError> {
        let write = self
            .db
            .insert_content_completion(&event.user_id, &event.course_id, &event.content_item_id, Utc::now())
            .await?;

        if write.created {
            self.metrics.record_completion(CompletionLevel::Content);
            tracing::info!(
                user_id = %event.user_id,
                course_id = %event.course_id,
                content_item_id = %event.content_item_id,
                "Content completed"
            );
            report.content_completed.push(event.content_item_id.clone());
        }

        let course = self
            .catalog
            .course(&event.course_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Course", &event.course_id))?;

        Ok(self
            .ensure_course_completion(&event.user_id, &course, report)
            .await?
            .map(CompletionEvent::from)
            .into_iter()
            .collect())
    }

    /// Creates the course completion if every required item is done.
    ///
    /// Returns the course event whenever the course is complete, not only
    /// when the row was created here, so plan cascades are re-checked.
    async fn ensure_course_completion(
        &self,
        user_id: &str,
        course: &Course,
        report: &mut CascadeReport,
    ) -> Result<Option<CourseCompletedEvent>, EngineError> {
        let required = self.catalog.required_content_ids(&course.id).await?;
        let completed = self.db.completed_content_ids(user_id, &course.id).await?;
        if !required.iter().all(|id| completed.contains(id)) {
            return Ok(None);
        }

        let write = self
            .db
            .complete_course(
                user_id,
                &course.id,
                &self.lifecycle.sources_for(EnrollmentStatus::Completed),
                Utc::now(),
            )
            .await?;

        if write.created {
            self.metrics.record_completion(CompletionLevel::Course);
            tracing::info!(
                user_id,
                course_id = %course.id,
                required = required.len(),
                "Course completed"
            );
            report.courses_completed.push(course.id.clone());
        }

        let flags = self.course_award_flags(user_id, course).await?;
        self.issue_awards(&write.completion, flags, report).await?;

        Ok(Some(CourseCompletedEvent {
            user_id: user_id.to_string(),
            course_id: course.id.clone(),
        }))
    }

    /// Course-level awards apply unless the user takes the course only
    /// through a learning plan; the plan's flags cover that case.
    async fn course_award_flags(&self, user_id: &str, course: &Course) -> Result<AwardFlags, EngineError> {
        let flags = course.awards();
        if !flags.any() {
            return Ok(flags);
        }

        let direct = self
            .db
            .enrollment(user_id, &EnrollmentTarget::Course(course.id.clone()))
            .await?;
        if direct.is_some_and(|e| e.status.grants_access()) {
            return Ok(flags);
        }

        for plan in self.catalog.plans_containing(&course.id).await? {
            if self.enrolled_in_plan(user_id, &plan).await? {
                tracing::debug!(user_id, course_id = %course.id, plan_id = %plan.id, "Course awards deferred to plan");
                return Ok(AwardFlags::default());
            }
        }
        Ok(flags)
    }

    async fn on_course_completed(
        &self,
        event: &CourseCompletedEvent,
        report: &mut CascadeReport,
    ) -> Result<Vec<CompletionEvent>, EngineError> {
        for plan in self.catalog.plans_containing(&event.course_id).await? {
            if self.enrolled_in_plan(&event.user_id, &plan).await? {
                self.ensure_plan_completion(&event.user_id, &plan, report).await?;
            }
        }
        Ok(Vec::new())
    }

    async fn enrolled_in_plan(&self, user_id: &str, plan: &LearningPlan) -> Result<bool, EngineError> {
        let enrollment = self
            .db
            .enrollment(user_id, &EnrollmentTarget::LearningPlan(plan.id.clone()))
            .await?;
        Ok(enrollment.is_some_and(|e| e.status.grants_access()))
    }

    async fn ensure_plan_completion(
        &self,
        user_id: &str,
        plan: &LearningPlan,
        report: &mut CascadeReport,
    ) -> Result<(), EngineError> {
        let mut total = 0usize;
        let mut done = 0usize;
        for course_id in &plan.course_ids {
            let required = self.catalog.required_content_ids(course_id).await?;
            let completed = self.db.completed_content_ids(user_id, course_id).await?;
            total += required.len();
            done += required.iter().filter(|id| completed.contains(*id)).count();
        }

        if done < total {
            tracing::debug!(user_id, plan_id = %plan.id, done, total, "Plan not yet complete");
            return Ok(());
        }

        let write = self
            .db
            .complete_plan(
                user_id,
                &plan.id,
                &self.lifecycle.sources_for(EnrollmentStatus::Completed),
                Utc::now(),
            )
            .await?;

        if write.created {
            self.metrics.record_completion(CompletionLevel::Plan);
            tracing::info!(user_id, plan_id = %plan.id, required = total, "Learning plan completed");
            report.plans_completed.push(plan.id.clone());
        }

        self.issue_awards(&write.completion, plan.awards(), report).await
    }

    async fn issue_awards(
        &self,
        completion: &Completion,
        flags: AwardFlags,
        report: &mut CascadeReport,
    ) -> Result<(), EngineError> {
        if !flags.any() {
            return Ok(());
        }
        let issued = self.issuer.issue(completion, flags).await?;
        if !issued.is_empty() {
            report.awards.push(issued);
        }
        Ok(())
    }

    // =========================================================================
    // Reads and repair
    // =========================================================================

    pub async fn course_progress(&self, user_id: &str, course_id: &str) -> Result<CourseProgressSummary, EngineError> {
        let items = self.catalog.course_content(course_id).await?;
        if items.is_empty() && self.catalog.course(course_id).await?.is_none() {
            return Err(EngineError::not_found("Course", course_id));
        }

        let completed = self.db.completed_content_ids(user_id, course_id).await?;
        let required: Vec<&str> = items
            .iter()
            .filter(|item| item.required)
            .map(|item| item.id.as_str())
            .collect();
        let completed_required = required.iter().filter(|id| completed.contains(**id)).count();
        let completed_items = items.iter().filter(|item| completed.contains(&item.id)).count();

        let percentage = if required.is_empty() {
            100.0
        } else {
            completed_required as f64 / required.len() as f64 * 100.0
        };
        let completion = self.db.course_completion(user_id, course_id).await?;

        Ok(CourseProgressSummary {
            course_id: course_id.to_string(),
            required_items: required.len(),
            completed_required_items: completed_required,
            completed_items,
            percentage,
            // No required items means nothing left to do, even before a
            // cascade has written the course row.
            completed: completion.is_some() || required.is_empty(),
            completion,
        })
    }

    /// Re-derives content completions from stored progress and attempts,
    /// then re-runs the course cascade.
    ///
    /// Covers empty courses (vacuously complete) and cascades interrupted
    /// after the progress write.
    pub async fn recompute_course(&self, user_id: &str, course_id: &str) -> Result<CascadeReport, EngineError> {
        let course = self
            .catalog
            .course(course_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Course", course_id))?;

        let mut report = CascadeReport::default();
        let recorded = self.db.completed_content_ids(user_id, course_id).await?;

        for item in self.catalog.course_content(course_id).await? {
            if recorded.contains(&item.id) || !self.has_finished(user_id, item.id.as_str(), item.content_type).await? {
                continue;
            }
            tracing::info!(user_id, course_id, content_item_id = %item.id, "Repairing missing content completion");
            let event = ContentCompletedEvent::new(user_id, course_id, &item.id);
            merge(&mut report, self.dispatch(event).await?);
        }

        if let Some(event) = self.ensure_course_completion(user_id, &course, &mut report).await? {
            merge(&mut report, self.dispatch(event).await?);
        }
        Ok(report)
    }

    /// Whether stored progress or attempts show the item as done.
    async fn has_finished(&self, user_id: &str, content_item_id: &str, content_type: ContentType) -> Result<bool, EngineError> {
        let finished = match content_type {
            ContentType::Video => self
                .db
                .get_video_progress(user_id, content_item_id)
                .await?
                .is_some_and(|p| p.completed),
            ContentType::Test => match self.catalog.test_for_content(content_item_id).await? {
                Some(test) => self.db.has_passed_attempt(&test.id, user_id).await?,
                None => false,
            },
            _ => self
                .db
                .get_content_progress(user_id, content_item_id)
                .await?
                .is_some_and(|p| p.completed),
        };
        Ok(finished)
    }
}

fn merge(into: &mut CascadeReport, other: CascadeReport) {
    into.content_completed.extend(other.content_completed);
    into.courses_completed.extend(other.courses_completed);
    into.plans_completed.extend(other.plans_completed);
    into.awards.extend(other.awards);
}
