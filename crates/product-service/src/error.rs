use crate::dependency::DependencyError;
use crate::repository::RepositoryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use outbound_core::CancelReason;
use serde_json::json;
use thiserror::Error;

/// Errors returned by the HTTP handlers. Rendered as `{"error": "<message>"}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("product '{0}' not found")]
    NotFound(String),

    #[error("product '{0}' already exists")]
    Conflict(String),

    #[error(transparent)]
    Dependency(#[from] DependencyError),

    /// The request deadline passed while talking to storage.
    #[error("request {0}")]
    Cancelled(CancelReason),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Dependency(err) if err.is_unavailable() => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Dependency(_) | ApiError::Cancelled(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(id) => ApiError::NotFound(id),
            RepositoryError::AlreadyExists(id) => ApiError::Conflict(id),
        }
    }
}

impl From<CancelReason> for ApiError {
    fn from(reason: CancelReason) -> Self {
        ApiError::Cancelled(reason)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "failed to handle request");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
