//! Shared setup for integration tests: a file-backed database in a tempdir.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use lms_progress::catalog::SqliteCatalog;
use lms_progress::engine::{CertificateRenderer, Engine, RenderError, UrlCertificateRenderer};
use lms_progress::model::{
    Completion, ContentItem, ContentType, Course, EnrollmentStatus, EnrollmentTarget,
};
use lms_progress::storage::Database;

pub struct Harness {
    pub dir: TempDir,
    pub db: Database,
    pub catalog: SqliteCatalog,
    pub engine: Engine,
}

/// Renderer that counts how often it ran.
#[derive(Default)]
pub struct CountingRenderer {
    pub renders: AtomicUsize,
}

impl CountingRenderer {
    pub fn count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CertificateRenderer for CountingRenderer {
    async fn render(&self, completion: &Completion) -> Result<String, RenderError> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        // Widen the window between claim and store.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        Ok(format!("https://certs.test/{}", completion.id))
    }
}

pub async fn harness() -> Harness {
    harness_with_renderer(Arc::new(UrlCertificateRenderer::new("https://certs.test"))).await
}

pub async fn harness_with_renderer(renderer: Arc<dyn CertificateRenderer>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(&dir.path().join("lms.db")).await.unwrap();
    let catalog = SqliteCatalog::new(&db);
    let shared = Arc::new(catalog.clone());
    let engine = Engine::new(db.clone(), shared.clone(), shared, renderer);
    Harness {
        dir,
        db,
        catalog,
        engine,
    }
}

/// Creates a course with `required` required and `optional` optional PDF items
/// named `{course}-r{n}` and `{course}-o{n}`.
pub async fn course(h: &Harness, course: Course, required: usize, optional: usize) -> Vec<String> {
    let id = course.id.clone();
    h.catalog.put_course(&course).await.unwrap();

    let mut ids = Vec::new();
    for n in 0..required + optional {
        let is_required = n < required;
        let item_id = if is_required {
            format!("{}-r{}", id, n + 1)
        } else {
            format!("{}-o{}", id, n + 1 - required)
        };
        let mut item = ContentItem::new(item_id.as_str(), id.as_str(), ContentType::Pdf, n as i64 + 1);
        item.required = is_required;
        h.catalog.put_content_item(&item).await.unwrap();
        ids.push(item_id);
    }
    ids
}

pub async fn enroll(h: &Harness, user_id: &str, target: EnrollmentTarget) {
    h.db.upsert_enrollment(user_id, &target, EnrollmentStatus::Enrolled, Utc::now())
        .await
        .unwrap();
}

pub async fn enrollment_status(h: &Harness, user_id: &str, target: EnrollmentTarget) -> EnrollmentStatus {
    h.db.enrollment(user_id, &target).await.unwrap().unwrap().status
}
