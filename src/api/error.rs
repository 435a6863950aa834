//! API error types.
//!
//! Errors raised before a record stream opens are answered as plain text so
//! the front-end can show them verbatim.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::pipeline::rag::validate::InputError;

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(#[from] InputError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::BadRequest(input) => {
                tracing::debug!(reason = %input, "Rejected chat request");
                (
                    StatusCode::BAD_REQUEST,
                    [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                    input.user_message(),
                )
                    .into_response()
            }
        }
    }
}
