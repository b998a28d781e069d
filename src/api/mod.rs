//! REST surface of the engine.
//!
//! Endpoints (caller identified by the `x-user-id` header):
//! - `POST /api/progress/video`, `GET /api/progress/video/:id`
//! - `POST /api/progress/content`, `GET /api/progress/content/:id`
//! - `POST /api/tests/submit`, `GET /api/tests/:id/attempts`
//! - `GET|PUT|POST /api/content/:id/prerequisites`
//! - `GET /api/content/:id/access`
//! - `GET /api/courses/:id/progress`, `POST /api/courses/:id/completion/recompute`
//! - `GET /api/completions`, `GET /api/completions/:id`
//! - `GET /health`, `GET /metrics`

pub mod error;
pub mod handlers;
pub mod identity;

pub use error::ApiError;
pub use identity::{UserId, USER_ID_HEADER};

use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;

use crate::engine::Engine;
use crate::metrics::metrics_handler;

/// Build the router (separated from `serve` for testing).
pub fn router(engine: Engine) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(metrics_handler))
        .route("/api/progress/video", post(handlers::record_video))
        .route("/api/progress/video/:content_item_id", get(handlers::video_progress))
        .route("/api/progress/content", post(handlers::record_content))
        .route("/api/progress/content/:content_item_id", get(handlers::content_progress))
        .route("/api/tests/submit", post(handlers::submit_test))
        .route("/api/tests/:test_id/attempts", get(handlers::test_attempts))
        .route(
            "/api/content/:content_item_id/prerequisites",
            get(handlers::prerequisites)
                .put(handlers::replace_prerequisites)
                .post(handlers::add_prerequisite),
        )
        .route("/api/content/:content_item_id/access", get(handlers::content_access))
        .route("/api/courses/:course_id/progress", get(handlers::course_progress))
        .route(
            "/api/courses/:course_id/completion/recompute",
            post(handlers::recompute_course),
        )
        .route("/api/completions", get(handlers::completions))
        .route("/api/completions/:completion_id", get(handlers::completion))
        .with_state(engine)
}

/// Serve the API until the process is stopped.
pub async fn serve(engine: Engine, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "LMS progress API listening");
    axum::serve(listener, router(engine)).await
}
