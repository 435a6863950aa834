//! Chat endpoint.
//!
//! `POST /api/chat` with `{message, userId?}` answers either a plain-text 400
//! (before any stream opens) or a 200 newline-delimited JSON record stream.

use axum::body::Bytes;
use axum::extract::State;
use axum::response::Response;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::pipeline::rag::orchestrator::spawn_chat_stream;
use crate::pipeline::rag::stream::record_stream_response;
use crate::pipeline::rag::validate::validate_chat_body;

/// `POST /api/chat`: validate, then stream the answer.
///
/// The body is taken raw so malformed JSON gets the same fixed 400 text as
/// a missing message.
pub async fn send(State(ctx): State<ApiContext>, body: Bytes) -> Result<Response, ApiError> {
    let chat = validate_chat_body(&body)?;
    let rx = spawn_chat_stream(ctx.core.clone(), chat);
    Ok(record_stream_response(rx))
}
