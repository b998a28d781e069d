//! Error types for progress tracking operations.
//!
//! `EngineError` is the domain taxonomy every operation returns:
//! - malformed input (`Validation`, with a field → message map)
//! - missing references (`NotFound`)
//! - semantically invalid operations (`BadRequest`)
//! - access and attempt-limit denials (`Forbidden`)
//! - storage or transaction failures (`Internal`)
//!
//! Each variant maps to a stable machine-readable [`ErrorCode`].

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::storage::DatabaseError;

/// Stable codes carried by every error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    NotFound,
    BadRequest,
    Forbidden,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by the progress engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        fields: BTreeMap<String, String>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::Validation { .. } => ErrorCode::ValidationError,
            EngineError::NotFound(_) => ErrorCode::NotFound,
            EngineError::BadRequest(_) => ErrorCode::BadRequest,
            EngineError::Forbidden(_) => ErrorCode::Forbidden,
            EngineError::Internal(_) => ErrorCode::InternalError,
        }
    }

    pub fn not_found(what: &str, id: &str) -> Self {
        EngineError::NotFound(format!("{} '{}' not found", what, id))
    }

    /// Field map for validation errors, empty otherwise.
    pub fn fields(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            EngineError::Validation { fields, .. } => Some(fields),
            _ => None,
        }
    }
}

impl From<DatabaseError> for EngineError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(what) => EngineError::NotFound(what),
            other => EngineError::Internal(other.to_string()),
        }
    }
}

impl From<CatalogError> for EngineError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Database(db) => EngineError::from(db),
            CatalogError::Invalid(msg) => EngineError::Internal(msg),
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::from(DatabaseError::from(err))
    }
}

/// Collects field-level problems before failing with a single error.
#[derive(Debug, Default)]
pub struct ValidationErrors {
    fields: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_insert_with(|| message.into());
    }

    /// Requires `value` to be a finite number inside `[min, max]`.
    pub fn check_range(&mut self, field: &str, value: f64, min: f64, max: f64) {
        if !value.is_finite() {
            self.add(field, "must be a finite number");
        } else if value < min || value > max {
            self.add(field, format!("must be between {} and {}", min, max));
        }
    }

    pub fn check_non_negative(&mut self, field: &str, value: f64) {
        if !value.is_finite() {
            self.add(field, "must be a finite number");
        } else if value < 0.0 {
            self.add(field, "must not be negative");
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_result(self) -> Result<(), EngineError> {
        if self.fields.is_empty() {
            return Ok(());
        }
        let message = self
            .fields
            .iter()
            .map(|(field, msg)| format!("{} {}", field, msg))
            .collect::<Vec<_>>()
            .join("; ");
        Err(EngineError::Validation {
            message,
            fields: self.fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(
            EngineError::Forbidden("x".into()).code().as_str(),
            "FORBIDDEN"
        );
        assert_eq!(
            EngineError::Internal("x".into()).code().as_str(),
            "INTERNAL_ERROR"
        );
        assert_eq!(
            serde_json::to_string(&ErrorCode::ValidationError).unwrap(),
            "\"VALIDATION_ERROR\""
        );
    }

    #[test]
    fn test_validation_errors_collect_fields() {
        let mut errors = ValidationErrors::new();
        errors.check_non_negative("watchTime", -1.0);
        errors.check_range("lastPosition", 1.5, 0.0, 1.0);
        errors.check_range("progress", 0.5, 0.0, 1.0);

        let err = errors.into_result().unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
        let fields = err.fields().unwrap();
        assert_eq!(fields.len(), 2);
        assert!(fields.contains_key("watchTime"));
        assert!(fields.contains_key("lastPosition"));
    }

    #[test]
    fn test_nan_is_rejected() {
        let mut errors = ValidationErrors::new();
        errors.check_range("progress", f64::NAN, 0.0, 1.0);
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_database_not_found_maps_to_not_found() {
        let err: EngineError = DatabaseError::NotFound("completion x".into()).into();
        assert_eq!(err.code(), ErrorCode::NotFound);

        let err: EngineError = DatabaseError::Transaction("boom".into()).into();
        assert_eq!(err.code(), ErrorCode::InternalError);
    }
}
