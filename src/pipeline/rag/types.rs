use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};

use super::{ModelError, RagError};

/// A reference chunk returned by semantic search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
    pub id: String,
    pub content: String,
    pub score: f32,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub risk_level: Option<String>,
}

/// Candidates for one query, assumed sorted by descending score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    #[serde(default)]
    pub items: Vec<ContextItem>,
    #[serde(default)]
    pub fallback_needed: bool,
}

impl RetrievalResult {
    /// Result used when retrieval is unavailable: nothing found, answer from
    /// the fallback template.
    pub fn fallback() -> Self {
        Self {
            items: Vec::new(),
            fallback_needed: true,
        }
    }
}

/// Prompt/completion token counts reported by the model provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl Usage {
    pub fn is_empty(&self) -> bool {
        self.prompt_tokens == 0 && self.completion_tokens == 0
    }
}

/// Final token accounting sent to the caller in the `token_info` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    pub estimated: bool,
}

/// Everything the model provider needs for one streaming generation.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_message: String,
    pub model: String,
    pub max_output_tokens: u32,
}

/// One event pulled from a streaming generation.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    /// Incremental generated text (may be empty).
    Delta(String),
    /// Usage metrics arriving on a chunk before the finish signal.
    Usage(Usage),
    /// Generation is complete. Usage may ride along with the terminal chunk.
    Finished { usage: Option<Usage> },
}

/// Cancellable stream of model events. Dropping it releases the upstream
/// connection.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<ModelEvent, ModelError>> + Send>>;

/// Semantic search over the reference store.
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<RetrievalResult, RagError>;
}

/// Streaming chat-generation provider.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn stream_chat(&self, request: &CompletionRequest) -> Result<DeltaStream, ModelError>;
}
