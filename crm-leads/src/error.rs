//! HTTP error mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Error returned by every handler
///
/// Serialized as `{"error": "<message>"}` with a status code derived from
/// the underlying [`crm_common::Error`] variant.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Common(#[from] crm_common::Error),

    /// Request body could not be decoded
    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        use crm_common::Error;

        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Common(err) => match err {
                Error::NotFound(_) => StatusCode::NOT_FOUND,
                Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
                Error::Conflict(_) => StatusCode::CONFLICT,
                Error::Database(_) | Error::Io(_) | Error::Config(_) | Error::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            ApiError::Common(crm_common::Error::NotFound(msg))
            | ApiError::Common(crm_common::Error::InvalidInput(msg))
            | ApiError::Common(crm_common::Error::Conflict(msg))
            | ApiError::BadRequest(msg) => msg.clone(),
            other => other.to_string(),
        };

        if status.is_server_error() {
            error!(status = status.as_u16(), "Request failed: {}", message);
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
