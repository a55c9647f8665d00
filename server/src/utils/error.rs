use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::error;

use crate::models::EventSession;
use crate::utils::response::error as error_response;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid time range: start {start} is after end {end}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Session overlaps {} existing session(s) at this venue", .0.len())]
    SchedulingConflict(Vec<EventSession>),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store error")]
    TransientStore(#[from] sqlx::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) | AppError::InvalidRange { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::SchedulingConflict(_) | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::TransientStore(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::InvalidRange { .. } => "INVALID_RANGE",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::SchedulingConflict(_) => "SCHEDULING_CONFLICT",
            AppError::Conflict(_) => "CONFLICT",
            AppError::TransientStore(_) => "TRANSIENT_STORE_ERROR",
        }
    }

    /// Transient failures are worth retrying as-is; everything else needs the caller to change input.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::TransientStore(_))
    }

    fn log(&self) {
        match self {
            AppError::TransientStore(e) => {
                error!(error = ?e, "Store error");
            }
            other => {
                tracing::debug!(code = other.code(), error = %other, "Request rejected");
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        self.log();

        // Only expose high-level message to the client
        let public_message = match &self {
            AppError::ValidationError(msg) | AppError::NotFound(msg) | AppError::Conflict(msg) => {
                msg.clone()
            }
            AppError::InvalidRange { .. } | AppError::SchedulingConflict(_) => self.to_string(),
            AppError::TransientStore(_) => "The store is temporarily unavailable".to_string(),
        };

        // Conflicting sessions let the client pick another slot without guessing.
        let details = match &self {
            AppError::SchedulingConflict(sessions) => serde_json::to_value(sessions).ok(),
            _ => None,
        };

        error_response(code, public_message, details, status)
    }
}
