pub mod types;
pub mod validate;
pub mod medical_context;
pub mod retrieval;
pub mod prompt;
pub mod openai;
pub mod completion;
pub mod stream;
pub mod orchestrator;

use thiserror::Error;

/// Shown when the model provider has no usable API key.
pub const MISSING_CREDENTIALS_TEXT: &str =
    "Hệ thống AI chưa được cấu hình đúng (thiếu khóa truy cập). Vui lòng liên hệ quản trị viên.";

/// Shown when the model provider throttles the request.
pub const RATE_LIMIT_TEXT: &str =
    "Hệ thống đang quá tải, vui lòng thử lại sau ít phút.";

/// Shown when the failure came from reference-data lookup.
pub const RETRIEVAL_FAILURE_TEXT: &str =
    "Không thể truy xuất dữ liệu tham khảo lúc này. Vui lòng thử lại sau.";

/// Shown for every other failure after the stream has opened.
pub const GENERIC_FAILURE_TEXT: &str =
    "Đã xảy ra lỗi khi tạo câu trả lời. Vui lòng thử lại.";

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Context retrieval failed: {0}")]
    Retrieval(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Stream encoding failed: {0}")]
    Encoding(String),
}

/// Failures from the streaming chat-generation provider. Never retried.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model provider API key is not configured")]
    MissingApiKey,

    #[error("Model provider rejected credentials (HTTP {0})")]
    Unauthorized(u16),

    #[error("Model provider rate limit exceeded")]
    RateLimited,

    #[error("Model provider returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Model provider connection failed: {0}")]
    Connection(String),

    #[error("Streaming error: {0}")]
    StreamingError(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),
}

/// Which fixed user-facing message a failure maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    MissingCredentials,
    RateLimited,
    Retrieval,
    Generic,
}

impl FailureClass {
    pub fn user_message(self) -> &'static str {
        match self {
            FailureClass::MissingCredentials => MISSING_CREDENTIALS_TEXT,
            FailureClass::RateLimited => RATE_LIMIT_TEXT,
            FailureClass::Retrieval => RETRIEVAL_FAILURE_TEXT,
            FailureClass::Generic => GENERIC_FAILURE_TEXT,
        }
    }
}

/// Classify a pipeline failure for the terminal `error` record.
pub fn classify_failure(err: &RagError) -> FailureClass {
    match err {
        RagError::Retrieval(_) => FailureClass::Retrieval,
        RagError::Encoding(_) => FailureClass::Generic,
        RagError::Model(model) => match model {
            ModelError::MissingApiKey | ModelError::Unauthorized(_) => {
                FailureClass::MissingCredentials
            }
            ModelError::RateLimited => FailureClass::RateLimited,
            ModelError::Upstream { status: 429, .. } => FailureClass::RateLimited,
            ModelError::Upstream { body, .. } if mentions_retrieval(body) => {
                FailureClass::Retrieval
            }
            _ => FailureClass::Generic,
        },
    }
}

fn mentions_retrieval(body: &str) -> bool {
    let lower = body.to_lowercase();
    ["embedding", "vector", "retriev"]
        .iter()
        .any(|needle| lower.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_and_unauthorized_map_to_credentials() {
        assert_eq!(
            classify_failure(&ModelError::MissingApiKey.into()),
            FailureClass::MissingCredentials
        );
        assert_eq!(
            classify_failure(&ModelError::Unauthorized(401).into()),
            FailureClass::MissingCredentials
        );
    }

    #[test]
    fn rate_limit_is_recognised() {
        assert_eq!(
            classify_failure(&ModelError::RateLimited.into()),
            FailureClass::RateLimited
        );
        assert_eq!(
            FailureClass::RateLimited.user_message(),
            RATE_LIMIT_TEXT
        );
    }

    #[test]
    fn retrieval_failures_have_their_own_message() {
        assert_eq!(
            classify_failure(&RagError::Retrieval("timeout".into())),
            FailureClass::Retrieval
        );
        let upstream = ModelError::Upstream {
            status: 500,
            body: "Embedding model unavailable".into(),
        };
        assert_eq!(classify_failure(&upstream.into()), FailureClass::Retrieval);
    }

    #[test]
    fn everything_else_is_generic() {
        let upstream = ModelError::Upstream {
            status: 502,
            body: "bad gateway".into(),
        };
        assert_eq!(classify_failure(&upstream.into()), FailureClass::Generic);
        assert_eq!(
            classify_failure(&ModelError::Connection("refused".into()).into()),
            FailureClass::Generic
        );
        assert_eq!(FailureClass::Generic.user_message(), GENERIC_FAILURE_TEXT);
    }
}
