//! Unified Error Handling
//!
//! One error type for the HTTP surface with machine-readable codes.
//! Engine errors on the review path are the only domain errors that
//! propagate to clients; the recommendation path degrades instead.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::services::fsrs::FsrsError;

#[derive(Error, Debug)]
pub enum AppError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Not found errors
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Rejected review rating (outside 1..=4)
    #[error("Invalid rating: {0}")]
    InvalidRating(i32),

    /// Card state unusable for scheduling
    #[error("Invalid card: {0}")]
    InvalidCard(String),

    /// FSRS arithmetic produced non-finite values
    #[error("Scheduling calculation failed: {0}")]
    Calculation(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Some("DATABASE_ERROR"),
                    "A database error occurred".to_string(),
                )
            }
            AppError::NotFound { resource, id } => (
                StatusCode::NOT_FOUND,
                Some("NOT_FOUND"),
                format!("{} with id '{}' not found", resource, id),
            ),
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                Some("VALIDATION_ERROR"),
                msg.clone(),
            ),
            AppError::InvalidRating(rating) => (
                StatusCode::BAD_REQUEST,
                Some("INVALID_RATING"),
                format!("rating {} is outside 1..=4", rating),
            ),
            AppError::InvalidCard(msg) => (
                StatusCode::BAD_REQUEST,
                Some("INVALID_CARD"),
                msg.clone(),
            ),
            AppError::Calculation(msg) => {
                tracing::error!("FSRS calculation error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Some("FSRS_CALCULATION"),
                    msg.clone(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Some("INTERNAL_ERROR"),
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorResponse {
            error: message,
            code: code.map(String::from),
        };

        (status, Json(body)).into_response()
    }
}

impl From<FsrsError> for AppError {
    fn from(err: FsrsError) -> Self {
        match err {
            FsrsError::InvalidRating(r) => AppError::InvalidRating(r),
            FsrsError::InvalidCard(msg) => AppError::InvalidCard(msg),
            FsrsError::Calculation(msg) => AppError::Calculation(msg),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Validation(format!("JSON parsing error: {}", err))
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Helper trait for converting Option to AppError::NotFound
pub trait OptionExt<T> {
    fn ok_or_not_found(self, resource: &'static str, id: impl Into<String>) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, resource: &'static str, id: impl Into<String>) -> AppResult<T> {
        self.ok_or_else(|| AppError::NotFound {
            resource,
            id: id.into(),
        })
    }
}
