//! API error type and its HTTP translation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use slidecast_data::DataError;
use slidecast_pipeline::PipelineError;
use slidecast_queue::QueueError;
use slidecast_state::StateError;
use slidecast_storage::StorageError;

/// Errors surfaced by API handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource missing, or owned by someone else (indistinguishable by
    /// design).
    #[error("not found")]
    NotFound,
    /// The request payload or parameters are invalid.
    #[error("{0}")]
    InvalidInput(String),
    /// No valid session accompanies the request.
    #[error("authentication required")]
    Unauthorized,
    /// Internal failure; detail is logged, not leaked.
    #[error("internal error")]
    Internal {
        /// Log-only detail.
        detail: String,
    },
}

/// Convenience alias for handler results.
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Internal error with a logged detail message.
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal {
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            Self::InvalidInput(message) => (StatusCode::BAD_REQUEST, message.clone()),
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "authentication required".to_string(),
            ),
            Self::Internal { detail } => {
                error!(detail = %detail, "internal api error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<StateError> for ApiError {
    fn from(error: StateError) -> Self {
        Self::internal(error.to_string())
    }
}

impl From<QueueError> for ApiError {
    fn from(error: QueueError) -> Self {
        Self::internal(error.to_string())
    }
}

impl From<DataError> for ApiError {
    fn from(error: DataError) -> Self {
        Self::internal(error.to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        if error.is_not_found() {
            Self::NotFound
        } else {
            Self::internal(error.to_string())
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(error: PipelineError) -> Self {
        Self::internal(error.to_string())
    }
}
