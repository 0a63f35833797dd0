use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ferrobars_core::WarehouseError;
use serde_json::json;
use thiserror::Error;

/// Read API failures, rendered as `{"detail": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(&'static str),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error("storage failure: {0}")]
    Storage(#[from] WarehouseError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            Self::Storage(cause) => {
                tracing::error!(error = %cause, "storage read failed");
                String::from("Internal Server Error")
            }
            Self::Internal(cause) => {
                tracing::error!(error = %cause, "request failed");
                String::from("Internal Server Error")
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(error: tokio::task::JoinError) -> Self {
        Self::Internal(error.to_string())
    }
}
