//! Request validation. Runs before any collaborator is touched.

use serde_json::Value;
use thiserror::Error;

/// Upper bound on the trimmed message, in characters.
///
/// Counted in Unicode scalar values, not UTF-16 code units: a browser's
/// `String.length` reports 2 for an emoji outside the BMP, this counts 1.
pub const MAX_MESSAGE_CHARS: usize = 1000;

/// Sentinel the front-end sends for signed-out users.
pub const ANONYMOUS_USER: &str = "anonymous";

pub const EMPTY_MESSAGE_TEXT: &str = "Vui lòng nhập câu hỏi của bạn.";

pub const TOO_LONG_MESSAGE_TEXT: &str =
    "Câu hỏi quá dài. Vui lòng giới hạn trong 1000 ký tự.";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    /// Missing, non-text, blank, or unparseable body.
    #[error("{}", EMPTY_MESSAGE_TEXT)]
    EmptyMessage,

    #[error("{}", TOO_LONG_MESSAGE_TEXT)]
    MessageTooLong { chars: usize },
}

impl InputError {
    pub fn user_message(&self) -> &'static str {
        match self {
            InputError::EmptyMessage => EMPTY_MESSAGE_TEXT,
            InputError::MessageTooLong { .. } => TOO_LONG_MESSAGE_TEXT,
        }
    }
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedChat {
    /// Trimmed message text.
    pub message: String,
    /// `None` for anonymous callers, meaning no personalization.
    pub user_id: Option<String>,
}

/// Validate a raw JSON request body `{message, userId}`.
pub fn validate_chat_body(body: &[u8]) -> Result<ValidatedChat, InputError> {
    let value: Value = serde_json::from_slice(body).map_err(|_| InputError::EmptyMessage)?;
    validate_chat_request(&value)
}

/// Validate an already-parsed request body.
pub fn validate_chat_request(body: &Value) -> Result<ValidatedChat, InputError> {
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .ok_or(InputError::EmptyMessage)?;

    let chars = message.chars().count();
    if chars > MAX_MESSAGE_CHARS {
        return Err(InputError::MessageTooLong { chars });
    }

    let user_id = body
        .get("userId")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty() && *id != ANONYMOUS_USER)
        .map(str::to_string);

    Ok(ValidatedChat {
        message: message.to_string(),
        user_id,
    })
}
