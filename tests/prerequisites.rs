//! Unlock gating across sequential courses and prerequisite edges.

mod common;

use common::{course, enroll, harness};
use lms_progress::model::{ContentItem, ContentProgressReport, ContentType, Course, EnrollmentTarget};
use lms_progress::ErrorCode;

fn finished(content_item_id: &str) -> ContentProgressReport {
    ContentProgressReport {
        content_item_id: content_item_id.to_string(),
        progress: 1.0,
        pages_viewed: None,
        total_pages: None,
        last_page: None,
    }
}

#[tokio::test]
async fn test_reverse_edge_is_rejected_and_not_persisted() {
    let h = harness().await;
    let items = course(&h, Course::new("c1"), 2, 0).await;
    let (a, b) = (&items[0], &items[1]);

    assert!(h.engine.gate.add_prerequisite(a, b).await.unwrap());

    let err = h.engine.gate.add_prerequisite(b, a).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::BadRequest);
    assert!(h.engine.gate.prerequisites(b).await.unwrap().is_empty());

    let err = h
        .engine
        .gate
        .set_prerequisites(b, &[a.clone()])
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::BadRequest);
    assert!(h.db.prerequisites_of(b).await.unwrap().is_empty());
    assert_eq!(h.db.prerequisites_of(a).await.unwrap(), vec![b.clone()]);
}

#[tokio::test]
async fn test_invalid_edges_are_rejected() {
    let h = harness().await;
    let first = course(&h, Course::new("c1"), 1, 0).await;
    let second = course(&h, Course::new("c2"), 1, 0).await;

    let err = h.engine.gate.add_prerequisite(&first[0], &first[0]).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::BadRequest);

    let err = h.engine.gate.add_prerequisite(&first[0], &second[0]).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::BadRequest);

    let err = h.engine.gate.add_prerequisite(&first[0], "ghost").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);

    assert!(h.db.prerequisites_of(&first[0]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sequential_course_unlocks_in_order() {
    let h = harness().await;
    let items = course(&h, Course::new("seq").sequential(false), 3, 0).await;
    enroll(&h, "u1", EnrollmentTarget::Course("seq".into())).await;

    assert!(h.engine.gate.is_unlocked("u1", &items[0]).await.unwrap());
    assert!(!h.engine.gate.is_unlocked("u1", &items[1]).await.unwrap());

    let result = h
        .engine
        .recorder
        .record_content("u1", &finished(&items[0]))
        .await
        .unwrap();
    assert!(result.unlocked_next);
    assert!(h.engine.gate.is_unlocked("u1", &items[1]).await.unwrap());
    assert!(!h.engine.gate.is_unlocked("u1", &items[2]).await.unwrap());
}

#[tokio::test]
async fn test_skipping_course_still_honours_prerequisites() {
    let h = harness().await;
    let items = course(&h, Course::new("skip").sequential(true), 3, 0).await;
    enroll(&h, "u1", EnrollmentTarget::Course("skip".into())).await;

    assert!(h.engine.gate.is_unlocked("u1", &items[2]).await.unwrap());

    h.engine
        .gate
        .set_prerequisites(&items[2], &[items[1].clone()])
        .await
        .unwrap();
    assert!(!h.engine.gate.is_unlocked("u1", &items[2]).await.unwrap());

    h.engine
        .recorder
        .record_content("u1", &finished(&items[1]))
        .await
        .unwrap();
    assert!(h.engine.gate.is_unlocked("u1", &items[2]).await.unwrap());
}

#[tokio::test]
async fn test_replacing_prerequisites_dedups_and_clears() {
    let h = harness().await;
    let items = course(&h, Course::new("c1"), 3, 0).await;

    let stored = h
        .engine
        .gate
        .set_prerequisites(&items[2], &[items[1].clone(), items[0].clone(), items[1].clone()])
        .await
        .unwrap();
    assert_eq!(stored, vec![items[0].clone(), items[1].clone()]);

    let cleared = h.engine.gate.set_prerequisites(&items[2], &[]).await.unwrap();
    assert!(cleared.is_empty());
    assert!(h.engine.gate.prerequisites(&items[2]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_items_added_while_running_are_gated_correctly() {
    let h = harness().await;
    let items = course(&h, Course::new("c1"), 1, 0).await;
    enroll(&h, "u1", EnrollmentTarget::Course("c1".into())).await;
    assert!(h.engine.gate.is_unlocked("u1", &items[0]).await.unwrap());

    h.catalog
        .put_content_item(&ContentItem::new("late", "c1", ContentType::Pdf, 2))
        .await
        .unwrap();
    assert!(h.engine.gate.is_unlocked("u1", "late").await.unwrap());

    h.catalog
        .put_course(&Course::new("c1").sequential(false))
        .await
        .unwrap();
    assert!(!h.engine.gate.is_unlocked("u1", "late").await.unwrap());

    let result = h
        .engine
        .recorder
        .record_content("u1", &finished(&items[0]))
        .await
        .unwrap();
    assert!(result.unlocked_next);
    assert!(h.engine.gate.is_unlocked("u1", "late").await.unwrap());
}
