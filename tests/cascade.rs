//! Completion cascade behaviour end to end: progress reports through course
//! and learning plan completion, certificates, and concurrent triggers.

mod common;

use chrono::Utc;
use std::sync::Arc;

use common::{course, enroll, enrollment_status, harness, harness_with_renderer, CountingRenderer};
use lms_progress::model::{
    CompletionLevel, ContentCompletedEvent, ContentProgressReport, Course, EnrollmentStatus,
    EnrollmentTarget, LearningPlan, VideoProgressReport,
};

fn finished(content_item_id: &str) -> ContentProgressReport {
    ContentProgressReport {
        content_item_id: content_item_id.to_string(),
        progress: 1.0,
        pages_viewed: Some(10),
        total_pages: Some(10),
        last_page: Some(10),
    }
}

fn course_target(id: &str) -> EnrollmentTarget {
    EnrollmentTarget::Course(id.to_string())
}

fn plan_target(id: &str) -> EnrollmentTarget {
    EnrollmentTarget::LearningPlan(id.to_string())
}

#[tokio::test]
async fn test_identical_video_report_twice_is_idempotent() {
    let h = harness().await;
    h.catalog.put_course(&Course::new("c1")).await.unwrap();
    h.catalog
        .put_content_item(&lms_progress::model::ContentItem::new(
            "v1",
            "c1",
            lms_progress::model::ContentType::Video,
            1,
        ))
        .await
        .unwrap();
    enroll(&h, "u1", course_target("c1")).await;

    let report = VideoProgressReport {
        content_item_id: "v1".into(),
        watch_time: 300.0,
        total_duration: 300.0,
        last_position: 1.0,
        times_watched: Some(1),
    };
    let first = h.engine.recorder.record_video("u1", &report).await.unwrap();
    let second = h.engine.recorder.record_video("u1", &report).await.unwrap();

    assert_eq!(first.progress.watch_time, second.progress.watch_time);
    assert_eq!(first.progress.completed_at, second.progress.completed_at);
    assert_eq!(first.cascade.courses_completed, vec!["c1"]);
    assert!(second.cascade.is_empty());

    let completions = h.db.user_completions("u1").await.unwrap();
    let content_rows = completions
        .iter()
        .filter(|c| c.level() == CompletionLevel::Content)
        .count();
    assert_eq!(content_rows, 1);
}

#[tokio::test]
async fn test_course_completes_once_and_optional_item_changes_nothing() {
    let h = harness().await;
    let items = course(&h, Course::new("c1"), 3, 1).await;
    enroll(&h, "u1", course_target("c1")).await;

    for item in &items[..3] {
        h.engine.recorder.record_content("u1", &finished(item)).await.unwrap();
    }

    let course_row = h.db.course_completion("u1", "c1").await.unwrap().unwrap();
    assert_eq!(enrollment_status(&h, "u1", course_target("c1")).await, EnrollmentStatus::Completed);

    let optional = h.engine.recorder.record_content("u1", &finished(&items[3])).await.unwrap();
    assert!(optional.cascade.courses_completed.is_empty());

    let after = h.db.course_completion("u1", "c1").await.unwrap().unwrap();
    assert_eq!(course_row, after);

    let course_rows = h
        .db
        .user_completions("u1")
        .await
        .unwrap()
        .into_iter()
        .filter(|c| c.level() == CompletionLevel::Course)
        .count();
    assert_eq!(course_rows, 1);

    let summary = h.engine.course_progress("u1", "c1").await.unwrap();
    assert_eq!(summary.required_items, 3);
    assert_eq!(summary.completed_required_items, 3);
    assert_eq!(summary.completed_items, 4);
    assert!(summary.completed);
}

async fn plan_setup() -> (common::Harness, Vec<String>) {
    let h = harness().await;
    let mut items = course(&h, Course::new("ca"), 2, 0).await;
    items.extend(course(&h, Course::new("cb"), 2, 0).await);
    h.catalog
        .put_learning_plan(&LearningPlan::new("p1", vec!["ca".into(), "cb".into()]).with_awards(true, true))
        .await
        .unwrap();
    enroll(&h, "u1", plan_target("p1")).await;
    (h, items)
}

#[tokio::test]
async fn test_plan_completes_after_all_four_items_interleaved() {
    let (h, items) = plan_setup().await;

    // ca-r1, cb-r1, ca-r2, cb-r2
    let order = [&items[0], &items[2], &items[1], &items[3]];
    let mut plans_completed = Vec::new();
    for item in order {
        let result = h.engine.recorder.record_content("u1", &finished(item)).await.unwrap();
        plans_completed.extend(result.cascade.plans_completed);
    }

    assert_eq!(plans_completed, vec!["p1"]);
    let plan = h.db.plan_completion("u1", "p1").await.unwrap().unwrap();
    assert!(plan.certificate_url.is_some());
    assert!(plan.badge_awarded);
    assert_eq!(enrollment_status(&h, "u1", plan_target("p1")).await, EnrollmentStatus::Completed);

    // Re-delivering the last event leaves everything as it was.
    let replay = h
        .engine
        .aggregator
        .dispatch(ContentCompletedEvent::new("u1", "cb", &items[3]))
        .await
        .unwrap();
    assert!(replay.is_empty());
    assert_eq!(h.db.plan_completion("u1", "p1").await.unwrap().unwrap(), plan);
}

#[tokio::test]
async fn test_plan_incomplete_with_three_of_four() {
    let (h, items) = plan_setup().await;

    for item in [&items[3], &items[0], &items[1]] {
        h.engine.recorder.record_content("u1", &finished(item)).await.unwrap();
    }

    assert!(h.db.course_completion("u1", "ca").await.unwrap().is_some());
    assert!(h.db.course_completion("u1", "cb").await.unwrap().is_none());
    assert!(h.db.plan_completion("u1", "p1").await.unwrap().is_none());
    assert_eq!(enrollment_status(&h, "u1", plan_target("p1")).await, EnrollmentStatus::Enrolled);
}

#[tokio::test]
async fn test_empty_plan_course_is_vacuously_complete() {
    let h = harness().await;
    h.catalog.put_course(&Course::new("empty")).await.unwrap();
    h.catalog
        .put_learning_plan(&LearningPlan::new("p0", vec!["empty".into()]))
        .await
        .unwrap();
    enroll(&h, "u1", plan_target("p0")).await;

    let report = h.engine.recompute_course("u1", "empty").await.unwrap();
    assert_eq!(report.courses_completed, vec!["empty"]);
    assert_eq!(report.plans_completed, vec!["p0"]);
}

#[tokio::test]
async fn test_empty_course_reports_completed_once_enrolled() {
    let h = harness().await;
    h.catalog.put_course(&Course::new("empty")).await.unwrap();
    enroll(&h, "u1", course_target("empty")).await;

    let summary = h.engine.course_progress("u1", "empty").await.unwrap();
    assert_eq!(summary.required_items, 0);
    assert_eq!(summary.percentage, 100.0);
    assert!(summary.completed);
}

#[tokio::test]
async fn test_recompute_requires_access() {
    let h = harness().await;
    course(&h, Course::new("c1"), 1, 0).await;

    let err = h.engine.recompute_course("stranger", "c1").await.unwrap_err();
    assert_eq!(err.code(), lms_progress::ErrorCode::Forbidden);
    let err = h.engine.recompute_course("stranger", "missing").await.unwrap_err();
    assert_eq!(err.code(), lms_progress::ErrorCode::NotFound);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_triggers_issue_one_certificate() {
    let renderer = Arc::new(CountingRenderer::default());
    let h = harness_with_renderer(renderer.clone()).await;
    let items = course(&h, Course::new("c1").with_awards(true, true), 2, 0).await;
    enroll(&h, "u1", course_target("c1")).await;

    // Both items are already recorded, so either event alone completes the course.
    for item in &items {
        h.db.insert_content_completion("u1", "c1", item, Utc::now()).await.unwrap();
    }

    let tasks: Vec<_> = items
        .iter()
        .map(|item| {
            let engine = h.engine.clone();
            let event = ContentCompletedEvent::new("u1", "c1", item);
            tokio::spawn(async move { engine.aggregator.dispatch(event).await })
        })
        .collect();

    let mut courses_completed = 0;
    let mut certificates = 0;
    let mut badges = 0;
    for task in tasks {
        let report = task.await.unwrap().unwrap();
        courses_completed += report.courses_completed.len();
        certificates += report.awards.iter().filter(|a| a.certificate_url.is_some()).count();
        badges += report.awards.iter().filter(|a| a.badge_awarded).count();
    }

    assert_eq!(courses_completed, 1);
    assert_eq!(certificates, 1);
    assert_eq!(badges, 1);
    assert_eq!(renderer.count(), 1);

    let course_rows = h
        .db
        .user_completions("u1")
        .await
        .unwrap()
        .into_iter()
        .filter(|c| c.level() == CompletionLevel::Course)
        .count();
    assert_eq!(course_rows, 1);
}
