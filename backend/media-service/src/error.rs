/// Error types for Media Service
///
/// Errors raised by the ingestion pipeline are recorded on the video and
/// relayed to subscribers; errors raised by request handlers are converted
/// into JSON HTTP responses.
use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde::Serialize;
use thiserror::Error;

use crate::models::VideoStatus;

/// Result type for media-service operations
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// Cache operation failed
    #[error("Cache error: {0}")]
    Cache(String),

    /// Validation failed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unauthorized access
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Forbidden access
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Conflict with the current state of a resource
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Lifecycle status change that the state machine does not allow
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: VideoStatus, to: VideoStatus },

    /// Probe or transcode invocation failed
    #[error("Media tool error: {0}")]
    MediaTool(String),

    /// Remote asset store rejected an upload or delete
    #[error("Storage error: {0}")]
    Storage(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status: u16,
    #[serde(rename = "type")]
    pub error_type: String,
    pub code: String,
}

impl AppError {
    fn kind(&self) -> (&'static str, &'static str) {
        match self {
            AppError::Database(_) => ("server_error", "DATABASE_ERROR"),
            AppError::Cache(_) => ("server_error", "CACHE_ERROR"),
            AppError::Validation(_) => ("validation_error", "VALIDATION_ERROR"),
            AppError::NotFound(_) => ("not_found_error", "VIDEO_NOT_FOUND"),
            AppError::Unauthorized(_) => ("authentication_error", "INVALID_CREDENTIALS"),
            AppError::Forbidden(_) => ("authorization_error", "AUTHORIZATION_ERROR"),
            AppError::BadRequest(_) => ("validation_error", "INVALID_REQUEST"),
            AppError::Conflict(_) => ("conflict_error", "STATE_CONFLICT"),
            AppError::InvalidTransition { .. } => ("conflict_error", "INVALID_TRANSITION"),
            AppError::MediaTool(_) => ("server_error", "MEDIA_TOOL_ERROR"),
            AppError::Storage(_) => ("server_error", "STORAGE_ERROR"),
            AppError::Internal(_) => ("server_error", "INTERNAL_SERVER_ERROR"),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_)
            | AppError::Cache(_)
            | AppError::MediaTool(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Storage(_) => StatusCode::BAD_GATEWAY,
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) | AppError::InvalidTransition { .. } => StatusCode::CONFLICT,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let (error_type, code) = self.kind();

        let response = ErrorResponse {
            error: status
                .canonical_reason()
                .unwrap_or("Error")
                .to_string(),
            message: self.to_string(),
            status: status.as_u16(),
            error_type: error_type.to_string(),
            code: code.to_string(),
        };

        HttpResponse::build(status).json(response)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Video not found".to_string()),
            other => AppError::Database(other.to_string()),
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::Cache(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}
