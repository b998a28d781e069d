//! Progress reports for videos and documents.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use super::access::AccessEvaluator;
use super::aggregator::{CascadeReport, CompletionAggregator};
use super::gate::PrerequisiteGate;
use super::lifecycle::EnrollmentLifecycle;
use crate::catalog::Catalog;
use crate::error::{EngineError, ValidationErrors};
use crate::metrics::MetricsCollector;
use crate::model::{
    ContentCompletedEvent, ContentItem, ContentProgress, ContentProgressReport, ContentType,
    EnrollmentStatus, EnrollmentTarget, VideoProgress, VideoProgressReport,
};
use crate::storage::{ContentProgressUpsert, Database, VideoProgressUpsert};

/// A stored progress row plus what the write triggered.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResult<T> {
    pub progress: T,
    /// The next item by order exists and is reachable.
    pub unlocked_next: bool,
    pub completion_percentage: f64,
    #[serde(skip_serializing_if = "CascadeReport::is_empty")]
    pub cascade: CascadeReport,
}

pub struct ProgressRecorder {
    db: Database,
    catalog: Arc<dyn Catalog>,
    access: Arc<AccessEvaluator>,
    gate: Arc<PrerequisiteGate>,
    aggregator: Arc<CompletionAggregator>,
    lifecycle: Arc<EnrollmentLifecycle>,
    metrics: MetricsCollector,
}

impl ProgressRecorder {
    pub fn new(
        db: Database,
        catalog: Arc<dyn Catalog>,
        access: Arc<AccessEvaluator>,
        gate: Arc<PrerequisiteGate>,
        aggregator: Arc<CompletionAggregator>,
        lifecycle: Arc<EnrollmentLifecycle>,
    ) -> Self {
        Self {
            db,
            catalog,
            access,
            gate,
            aggregator,
            lifecycle,
            metrics: MetricsCollector::new(),
        }
    }

    pub async fn record_video(
        &self,
        user_id: &str,
        report: &VideoProgressReport,
    ) -> Result<ProgressResult<VideoProgress>, EngineError> {
        let mut errors = ValidationErrors::new();
        require_id(&mut errors, &report.content_item_id);
        errors.check_non_negative("watchTime", report.watch_time);
        errors.check_non_negative("totalDuration", report.total_duration);
        if report.total_duration == 0.0 {
            errors.add("totalDuration", "must be greater than 0");
        }
        errors.check_range("lastPosition", report.last_position, 0.0, 1.0);
        errors.into_result()?;

        let item = self.require_item(&report.content_item_id).await?;
        if item.content_type != ContentType::Video {
            return Err(EngineError::BadRequest(format!(
                "Content item '{}' is {}, not a video",
                item.id, item.content_type
            )));
        }
        self.access.require(user_id, &item.course_id).await?;

        // Compared as a product so watch_time == threshold * duration is exact.
        let meets_threshold = report.watch_time >= item.completion_threshold * report.total_duration;
        let write = self
            .db
            .upsert_video_progress(&VideoProgressUpsert {
                user_id,
                content_item_id: &item.id,
                watch_time: report.watch_time,
                total_duration: report.total_duration,
                last_position: report.last_position,
                times_watched: report.times_watched,
                meets_threshold,
                at: Utc::now(),
            })
            .await?;
        self.metrics.record_progress_report("video");
        tracing::debug!(
            user_id,
            content_item_id = %item.id,
            watch_time = report.watch_time,
            completed = write.row.completed,
            "Video progress recorded"
        );

        let cascade = self
            .after_write(user_id, &item, write.row.completed, write.newly_completed)
            .await?;
        let completion_percentage = write.row.completion_percentage();

        Ok(ProgressResult {
            unlocked_next: self.gate.next_unlocked(user_id, &item).await?,
            progress: write.row,
            completion_percentage,
            cascade,
        })
    }

    pub async fn record_content(
        &self,
        user_id: &str,
        report: &ContentProgressReport,
    ) -> Result<ProgressResult<ContentProgress>, EngineError> {
        let mut errors = ValidationErrors::new();
        require_id(&mut errors, &report.content_item_id);
        errors.check_range("progress", report.progress, 0.0, 1.0);
        errors.into_result()?;

        let item = self.require_item(&report.content_item_id).await?;
        if !item.content_type.is_document() {
            return Err(EngineError::BadRequest(format!(
                "Content item '{}' is {}; use the dedicated endpoint",
                item.id, item.content_type
            )));
        }
        self.access.require(user_id, &item.course_id).await?;

        let write = self
            .db
            .upsert_content_progress(&ContentProgressUpsert {
                user_id,
                content_item_id: &item.id,
                progress: report.progress,
                pages_viewed: report.pages_viewed,
                last_page: report.last_page,
                total_pages: report.total_pages,
                meets_threshold: report.progress >= item.completion_threshold,
                at: Utc::now(),
            })
            .await?;
        self.metrics.record_progress_report("content");
        tracing::debug!(
            user_id,
            content_item_id = %item.id,
            progress = report.progress,
            completed = write.row.completed,
            "Content progress recorded"
        );

        let cascade = self
            .after_write(user_id, &item, write.row.completed, write.newly_completed)
            .await?;
        let completion_percentage = write.row.progress * 100.0;

        Ok(ProgressResult {
            unlocked_next: self.gate.next_unlocked(user_id, &item).await?,
            progress: write.row,
            completion_percentage,
            cascade,
        })
    }

    /// Stored video progress, zeroed when nothing was reported yet.
    pub async fn video_progress(&self, user_id: &str, content_item_id: &str) -> Result<VideoProgress, EngineError> {
        self.require_item(content_item_id).await?;
        Ok(self
            .db
            .get_video_progress(user_id, content_item_id)
            .await?
            .unwrap_or_else(|| VideoProgress::empty(user_id, content_item_id)))
    }

    pub async fn content_progress(&self, user_id: &str, content_item_id: &str) -> Result<ContentProgress, EngineError> {
        self.require_item(content_item_id).await?;
        Ok(self
            .db
            .get_content_progress(user_id, content_item_id)
            .await?
            .unwrap_or_else(|| ContentProgress::empty(user_id, content_item_id)))
    }

    /// Enrollment bookkeeping and the cascade after a stored report.
    async fn after_write(
        &self,
        user_id: &str,
        item: &ContentItem,
        completed: bool,
        newly_completed: bool,
    ) -> Result<CascadeReport, EngineError> {
        self.lifecycle
            .advance(
                &self.db,
                user_id,
                &EnrollmentTarget::Course(item.course_id.clone()),
                EnrollmentStatus::InProgress,
                Utc::now(),
            )
            .await?;

        if !completed {
            return Ok(CascadeReport::default());
        }

        // A completed row without its completion record means an earlier
        // cascade was interrupted; run it again.
        let repair = !newly_completed
            && self
                .db
                .content_completion(user_id, &item.course_id, &item.id)
                .await?
                .is_none();
        if !newly_completed && !repair {
            return Ok(CascadeReport::default());
        }
        if repair {
            tracing::info!(user_id, content_item_id = %item.id, "Re-running interrupted cascade");
        }

        self.aggregator
            .dispatch(ContentCompletedEvent::new(user_id, &item.course_id, &item.id))
            .await
    }

    async fn require_item(&self, content_item_id: &str) -> Result<ContentItem, EngineError> {
        self.catalog
            .content_item(content_item_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Content item", content_item_id))
    }
}

fn require_id(errors: &mut ValidationErrors, content_item_id: &str) {
    if content_item_id.trim().is_empty() {
        errors.add("contentItemId", "is required");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SqliteCatalog;
    use crate::engine::certification::{CertificationIssuer, UrlCertificateRenderer};
    use crate::error::ErrorCode;
    use crate::model::Course;

    async fn setup() -> (Database, ProgressRecorder) {
        let db = Database::open_in_memory().await.unwrap();
        let catalog = SqliteCatalog::new(&db);
        catalog.put_course(&Course::new("c1").sequential(false)).await.unwrap();
        catalog
            .put_content_item(&ContentItem::new("v1", "c1", ContentType::Video, 1))
            .await
            .unwrap();
        catalog
            .put_content_item(&ContentItem::new("doc", "c1", ContentType::Pdf, 2).with_threshold(0.5))
            .await
            .unwrap();
        db.upsert_enrollment("u1", &EnrollmentTarget::Course("c1".into()), EnrollmentStatus::Enrolled, Utc::now())
            .await
            .unwrap();

        let shared: Arc<SqliteCatalog> = Arc::new(catalog);
        let lifecycle = Arc::new(EnrollmentLifecycle::new());
        let access = Arc::new(AccessEvaluator::new(db.clone(), shared.clone(), shared.clone()));
        let gate = Arc::new(PrerequisiteGate::new(db.clone(), shared.clone()));
        let issuer = Arc::new(CertificationIssuer::new(
            db.clone(),
            Arc::new(UrlCertificateRenderer::new("http://lms.test")),
        ));
        let aggregator = Arc::new(CompletionAggregator::new(
            db.clone(),
            shared.clone(),
            issuer,
            lifecycle.clone(),
        ));
        let recorder = ProgressRecorder::new(db.clone(), shared, access, gate, aggregator, lifecycle);
        (db, recorder)
    }

    fn video(watch_time: f64, total_duration: f64) -> VideoProgressReport {
        VideoProgressReport {
            content_item_id: "v1".into(),
            watch_time,
            total_duration,
            last_position: 0.5,
            times_watched: None,
        }
    }

    #[tokio::test]
    async fn test_threshold_boundary() {
        let (_db, recorder) = setup().await;

        let below = recorder.record_video("u1", &video(0.8 * 600.0 - 1.0, 600.0)).await.unwrap();
        assert!(!below.progress.completed);
        assert!(!below.unlocked_next);

        let at = recorder.record_video("u1", &video(0.8 * 600.0, 600.0)).await.unwrap();
        assert!(at.progress.completed);
        assert!(at.progress.completed_at.is_some());
        assert!(at.unlocked_next);
        assert_eq!(at.cascade.content_completed, vec!["v1"]);
    }

    #[tokio::test]
    async fn test_duplicate_report_is_idempotent() {
        let (db, recorder) = setup().await;

        let first = recorder.record_video("u1", &video(590.0, 600.0)).await.unwrap();
        let second = recorder.record_video("u1", &video(590.0, 600.0)).await.unwrap();
        assert_eq!(first.progress.completed_at, second.progress.completed_at);
        assert!(second.cascade.is_empty());
        assert_eq!(db.completed_content_ids("u1", "c1").await.unwrap().len(), 1);

        // Completion is sticky even when a later report falls below threshold.
        let third = recorder.record_video("u1", &video(10.0, 600.0)).await.unwrap();
        assert!(third.progress.completed);
        assert_eq!(third.progress.watch_time, 10.0);
    }

    #[tokio::test]
    async fn test_enrollment_moves_to_in_progress() {
        let (db, recorder) = setup().await;
        recorder.record_video("u1", &video(10.0, 600.0)).await.unwrap();
        let enrollment = db
            .enrollment("u1", &EnrollmentTarget::Course("c1".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(enrollment.status, EnrollmentStatus::InProgress);
    }

    #[tokio::test]
    async fn test_rejections() {
        let (_db, recorder) = setup().await;

        let err = recorder.record_video("u1", &video(-1.0, 600.0)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let mut bad_position = video(1.0, 600.0);
        bad_position.last_position = 1.5;
        assert_eq!(
            recorder.record_video("u1", &bad_position).await.unwrap_err().code(),
            ErrorCode::ValidationError
        );

        let mut missing = video(1.0, 600.0);
        missing.content_item_id = "ghost".into();
        assert_eq!(recorder.record_video("u1", &missing).await.unwrap_err().code(), ErrorCode::NotFound);

        let mut wrong_type = video(1.0, 600.0);
        wrong_type.content_item_id = "doc".into();
        assert_eq!(recorder.record_video("u1", &wrong_type).await.unwrap_err().code(), ErrorCode::BadRequest);

        let doc_on_video = ContentProgressReport {
            content_item_id: "v1".into(),
            progress: 0.5,
            pages_viewed: None,
            total_pages: None,
            last_page: None,
        };
        assert_eq!(
            recorder.record_content("u1", &doc_on_video).await.unwrap_err().code(),
            ErrorCode::BadRequest
        );

        assert_eq!(
            recorder.record_video("stranger", &video(1.0, 600.0)).await.unwrap_err().code(),
            ErrorCode::Forbidden
        );
    }

    #[tokio::test]
    async fn test_content_progress_and_reads() {
        let (_db, recorder) = setup().await;

        let empty = recorder.content_progress("u1", "doc").await.unwrap();
        assert_eq!(empty.progress, 0.0);
        assert!(!empty.completed);
        assert_eq!(recorder.video_progress("u1", "v1").await.unwrap().times_watched, 0);

        let report = ContentProgressReport {
            content_item_id: "doc".into(),
            progress: 0.5,
            pages_viewed: Some(5),
            total_pages: Some(10),
            last_page: Some(5),
        };
        let result = recorder.record_content("u1", &report).await.unwrap();
        assert!(result.progress.completed);
        assert_eq!(result.completion_percentage, 50.0);
        assert_eq!(result.progress.last_page, Some(5));
        assert!(!result.unlocked_next);
    }
}
