//! Request handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::identity::UserId;
use crate::engine::{
    AttemptRecord, CascadeReport, CourseProgressSummary, Engine, ProgressResult,
    TestSubmissionRequest, TestSubmissionResult,
};
use crate::model::{
    Completion, ContentProgress, ContentProgressReport, VideoProgress, VideoProgressReport,
};

type ApiResult<T> = Result<Json<T>, ApiError>;

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

// =============================================================================
// Progress
// =============================================================================

/// POST /api/progress/video
pub async fn record_video(
    State(engine): State<Engine>,
    UserId(user_id): UserId,
    payload: Result<Json<VideoProgressReport>, JsonRejection>,
) -> ApiResult<ProgressResult<VideoProgress>> {
    let Json(report) = payload?;
    Ok(Json(engine.recorder.record_video(&user_id, &report).await?))
}

/// GET /api/progress/video/:content_item_id
pub async fn video_progress(
    State(engine): State<Engine>,
    UserId(user_id): UserId,
    Path(content_item_id): Path<String>,
) -> ApiResult<VideoProgress> {
    Ok(Json(engine.recorder.video_progress(&user_id, &content_item_id).await?))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentProgressResponse {
    pub content_item_id: String,
    pub progress: f64,
    pub completed: bool,
    pub completion_percentage: f64,
    pub last_page: Option<u32>,
    pub unlocked_next: bool,
    #[serde(skip_serializing_if = "CascadeReport::is_empty")]
    pub cascade: CascadeReport,
}

impl From<ProgressResult<ContentProgress>> for ContentProgressResponse {
    fn from(result: ProgressResult<ContentProgress>) -> Self {
        Self {
            content_item_id: result.progress.content_item_id,
            progress: result.progress.progress,
            completed: result.progress.completed,
            completion_percentage: result.completion_percentage,
            last_page: result.progress.last_page,
            unlocked_next: result.unlocked_next,
            cascade: result.cascade,
        }
    }
}

/// POST /api/progress/content
pub async fn record_content(
    State(engine): State<Engine>,
    UserId(user_id): UserId,
    payload: Result<Json<ContentProgressReport>, JsonRejection>,
) -> ApiResult<ContentProgressResponse> {
    let Json(report) = payload?;
    let result = engine.recorder.record_content(&user_id, &report).await?;
    Ok(Json(result.into()))
}

/// GET /api/progress/content/:content_item_id
pub async fn content_progress(
    State(engine): State<Engine>,
    UserId(user_id): UserId,
    Path(content_item_id): Path<String>,
) -> ApiResult<ContentProgress> {
    Ok(Json(engine.recorder.content_progress(&user_id, &content_item_id).await?))
}

// =============================================================================
// Tests
// =============================================================================

/// POST /api/tests/submit
pub async fn submit_test(
    State(engine): State<Engine>,
    UserId(user_id): UserId,
    payload: Result<Json<TestSubmissionRequest>, JsonRejection>,
) -> ApiResult<TestSubmissionResult> {
    let Json(request) = payload?;
    Ok(Json(engine.submissions.submit(&user_id, &request).await?))
}

/// GET /api/tests/:test_id/attempts
pub async fn test_attempts(
    State(engine): State<Engine>,
    UserId(user_id): UserId,
    Path(test_id): Path<String>,
) -> ApiResult<Vec<AttemptRecord>> {
    Ok(Json(engine.submissions.attempts(&user_id, &test_id).await?))
}

// =============================================================================
// Prerequisites and unlocking
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrerequisitesResponse {
    pub content_item_id: String,
    pub prerequisite_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplacePrerequisites {
    #[serde(default)]
    pub prerequisite_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPrerequisite {
    pub prerequisite_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPrerequisiteResponse {
    pub content_item_id: String,
    pub prerequisite_id: String,
    pub created: bool,
}

/// GET /api/content/:content_item_id/prerequisites
pub async fn prerequisites(
    State(engine): State<Engine>,
    Path(content_item_id): Path<String>,
) -> ApiResult<PrerequisitesResponse> {
    let prerequisite_ids = engine.gate.prerequisites(&content_item_id).await?;
    Ok(Json(PrerequisitesResponse {
        content_item_id,
        prerequisite_ids,
    }))
}

/// PUT /api/content/:content_item_id/prerequisites
pub async fn replace_prerequisites(
    State(engine): State<Engine>,
    Path(content_item_id): Path<String>,
    payload: Result<Json<ReplacePrerequisites>, JsonRejection>,
) -> ApiResult<PrerequisitesResponse> {
    let Json(body) = payload?;
    let prerequisite_ids = engine
        .gate
        .set_prerequisites(&content_item_id, &body.prerequisite_ids)
        .await?;
    Ok(Json(PrerequisitesResponse {
        content_item_id,
        prerequisite_ids,
    }))
}

/// POST /api/content/:content_item_id/prerequisites
pub async fn add_prerequisite(
    State(engine): State<Engine>,
    Path(content_item_id): Path<String>,
    payload: Result<Json<AddPrerequisite>, JsonRejection>,
) -> Result<(StatusCode, Json<AddPrerequisiteResponse>), ApiError> {
    let Json(body) = payload?;
    let created = engine
        .gate
        .add_prerequisite(&content_item_id, &body.prerequisite_id)
        .await?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((
        status,
        Json(AddPrerequisiteResponse {
            content_item_id,
            prerequisite_id: body.prerequisite_id,
            created,
        }),
    ))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockResponse {
    pub content_item_id: String,
    pub unlocked: bool,
}

/// GET /api/content/:content_item_id/access
pub async fn content_access(
    State(engine): State<Engine>,
    UserId(user_id): UserId,
    Path(content_item_id): Path<String>,
) -> ApiResult<UnlockResponse> {
    let unlocked = engine.gate.is_unlocked(&user_id, &content_item_id).await?;
    Ok(Json(UnlockResponse {
        content_item_id,
        unlocked,
    }))
}

// =============================================================================
// Courses and completions
// =============================================================================

/// GET /api/courses/:course_id/progress
pub async fn course_progress(
    State(engine): State<Engine>,
    UserId(user_id): UserId,
    Path(course_id): Path<String>,
) -> ApiResult<CourseProgressSummary> {
    Ok(Json(engine.course_progress(&user_id, &course_id).await?))
}

/// POST /api/courses/:course_id/completion/recompute
pub async fn recompute_course(
    State(engine): State<Engine>,
    UserId(user_id): UserId,
    Path(course_id): Path<String>,
) -> ApiResult<CascadeReport> {
    Ok(Json(engine.recompute_course(&user_id, &course_id).await?))
}

/// GET /api/completions
pub async fn completions(State(engine): State<Engine>, UserId(user_id): UserId) -> ApiResult<Vec<Completion>> {
    Ok(Json(engine.completions(&user_id).await?))
}

/// GET /api/completions/:completion_id
///
/// Only the owner may read a completion; anyone else sees `NOT_FOUND`.
pub async fn completion(
    State(engine): State<Engine>,
    UserId(user_id): UserId,
    Path(completion_id): Path<String>,
) -> ApiResult<Completion> {
    let completion = engine.completion(&completion_id).await?;
    if completion.user_id != user_id {
        return Err(crate::error::EngineError::not_found("Completion", &completion_id).into());
    }
    Ok(Json(completion))
}
