use crate::services::object_store::StorageError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Per-item failures of the classification and relocation pipeline.
///
/// None of these are fatal to a reconciliation scan; the reactive path
/// surfaces them to its trigger so the trigger can decide on retries.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("object `{key}` is not a recognizable image: {reason}")]
    InvalidContent { key: String, reason: String },
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error("failed to read `{key}`: {source}")]
    ReadFailed {
        key: String,
        #[source]
        source: StorageError,
    },
    #[error("failed to relocate `{source_key}` to `{destination_key}`: {source}")]
    RelocationFailed {
        source_key: String,
        destination_key: String,
        #[source]
        source: StorageError,
    },
}

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ObjectNotFound { .. } => AppError::not_found(err.to_string()),
            StorageError::InvalidObjectKey | StorageError::InvalidContainerName { .. } => {
                AppError::new(StatusCode::BAD_REQUEST, err.to_string())
            }
            other => AppError::internal(other.to_string()),
        }
    }
}

impl From<ProcessingError> for AppError {
    fn from(err: ProcessingError) -> Self {
        let status = match &err {
            ProcessingError::InvalidContent { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ProcessingError::InvalidKey(_) => StatusCode::BAD_REQUEST,
            ProcessingError::ReadFailed { .. } | ProcessingError::RelocationFailed { .. } => {
                StatusCode::BAD_GATEWAY
            }
        };
        AppError::new(status, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processing_errors_map_to_retryable_and_permanent_statuses() {
        let invalid = AppError::from(ProcessingError::InvalidContent {
            key: "input/a.png".into(),
            reason: "empty payload".into(),
        });
        assert_eq!(invalid.status, StatusCode::UNPROCESSABLE_ENTITY);

        let bad_key = AppError::from(ProcessingError::InvalidKey("".into()));
        assert_eq!(bad_key.status, StatusCode::BAD_REQUEST);

        let failed = AppError::from(ProcessingError::RelocationFailed {
            source_key: "input/a.png".into(),
            destination_key: "processed/Unknown/a.png".into(),
            source: StorageError::Io(std::io::Error::other("disk full")),
        });
        assert_eq!(failed.status, StatusCode::BAD_GATEWAY);
        assert!(failed.message.contains("disk full"));
    }

    #[test]
    fn missing_objects_are_not_found() {
        let err = AppError::from(StorageError::ObjectNotFound {
            container: "cards".into(),
            key: "input/a.png".into(),
        });
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
