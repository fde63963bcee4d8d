use crate::services::aggregation_service::AggregateError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for request failures that keeps the message local.
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
        let body = Json(json!({ "message": self.message }));
        (self.status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

/// Translate pipeline failures into one HTTP response each.
///
/// Transport and codec failures are logged with their detail and surfaced
/// with a generic message only; everything else carries a user-facing
/// message directly.
impl From<AggregateError> for AppError {
    fn from(err: AggregateError) -> Self {
        match err {
            AggregateError::InvalidInput(message) => {
                AppError::new(StatusCode::BAD_REQUEST, message)
            }
            AggregateError::NoCandidatesListed => {
                AppError::not_found("No files found in the source bucket.")
            }
            AggregateError::NoCandidatesAfterFilter {
                extension,
                start,
                end,
            } => AppError::not_found(format!(
                "No {} files found for the date range {} to {}.",
                extension, start, end
            )),
            AggregateError::TooManyCandidates { found, limit } => AppError::new(
                StatusCode::BAD_REQUEST,
                format!(
                    "Error: Found {} files, which exceeds the limit of {}.",
                    found, limit
                ),
            ),
            AggregateError::NoDataFound => {
                AppError::not_found("No data found in any of the filtered Excel files.")
            }
            AggregateError::Transport(source) => {
                tracing::error!(error = %source, "blob store call failed");
                AppError::internal("An unexpected error occurred during aggregation.")
            }
            AggregateError::Codec(source) => {
                tracing::error!(error = %source, "codec failure during aggregation");
                AppError::internal("An unexpected error occurred during aggregation.")
            }
        }
    }
}
