//! HTTP error mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::common::RelayError;

/// Errors returned by API handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error("Invalid request body: {0}")]
    InvalidBody(#[from] JsonRejection),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Relay(RelayError::MissingField(_)) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Relay(RelayError::Blocked { rule }) => {
                tracing::info!("Refused /send matching filter rule '{}'", rule);
                (StatusCode::UNPROCESSABLE_ENTITY, self.to_string())
            }
            ApiError::Relay(RelayError::Interrupted) => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            ApiError::Relay(RelayError::Upstream { context, source }) => {
                tracing::error!("{}: {}", context, source);
                (StatusCode::INTERNAL_SERVER_ERROR, context.to_string())
            }
            ApiError::InvalidBody(rejection) => (StatusCode::BAD_REQUEST, rejection.body_text()),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
