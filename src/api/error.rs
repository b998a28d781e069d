//! Error responses.
//!
//! Every failure is rendered as
//! `{"error": {"code": "...", "message": "...", "fields": {...}}}` with
//! `fields` present only for validation errors.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{EngineError, ErrorCode};
use crate::metrics::MetricsCollector;

#[derive(Debug)]
pub struct ApiError(pub EngineError);

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Debug, Serialize)]
struct ErrorDetail<'a> {
    code: ErrorCode,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a BTreeMap<String, String>>,
}

pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::ValidationError | ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("body".to_string(), rejection.body_text());
        ApiError(EngineError::Validation {
            message: "Malformed request body".to_string(),
            fields,
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.code();
        let status = status_for(code);
        MetricsCollector::new().record_rejection(code);

        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::debug!(code = code.as_str(), error = %self.0, "Request rejected");
        }

        // Storage details stay in the logs.
        let message = match &self.0 {
            EngineError::Internal(_) => "Internal error".to_string(),
            EngineError::Validation { message, .. }
            | EngineError::NotFound(message)
            | EngineError::BadRequest(message)
            | EngineError::Forbidden(message) => message.clone(),
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code,
                message,
                fields: self.0.fields(),
            },
        };
        (status, Json(body)).into_response()
    }
}
