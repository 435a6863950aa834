use async_trait::async_trait;
use serde::Serialize;

use super::types::{ContextItem, ContextRetriever, RetrievalResult};
use super::RagError;

/// At most this many chunks are placed in the grounded prompt.
pub const MAX_CONTEXT_ITEMS: usize = 2;

/// Keep candidates scoring at least `threshold`, in their original order,
/// capped at [`MAX_CONTEXT_ITEMS`].
///
/// `fallback_needed` is set when the retriever asked for it or nothing
/// survived. An upstream fallback signal wins even over high-scoring items.
pub fn filter_relevant(result: RetrievalResult, threshold: f32) -> RetrievalResult {
    let items: Vec<ContextItem> = result
        .items
        .into_iter()
        .filter(|item| item.score >= threshold)
        .take(MAX_CONTEXT_ITEMS)
        .collect();

    let fallback_needed = result.fallback_needed || items.is_empty();

    RetrievalResult {
        items,
        fallback_needed,
    }
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
}

/// Semantic search service reached over HTTP: `POST {url}` with
/// `{"query": ...}`, answering with a [`RetrievalResult`] body.
pub struct HttpContextRetriever {
    url: String,
    client: reqwest::Client,
}

impl HttpContextRetriever {
    pub fn new(url: &str, client: reqwest::Client) -> Self {
        Self {
            url: url.to_string(),
            client,
        }
    }
}

#[async_trait]
impl ContextRetriever for HttpContextRetriever {
    async fn retrieve(&self, query: &str) -> Result<RetrievalResult, RagError> {
        let response = self
            .client
            .post(&self.url)
            .json(&SearchRequest { query })
            .send()
            .await
            .map_err(|e| RagError::Retrieval(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Retrieval(format!("HTTP {}: {body}", status.as_u16())));
        }

        response
            .json::<RetrievalResult>()
            .await
            .map_err(|e| RagError::Retrieval(format!("invalid search response: {e}")))
    }
}

/// Retriever that always answers with the same result.
pub struct StaticRetriever {
    result: RetrievalResult,
}

impl StaticRetriever {
    pub fn new(result: RetrievalResult) -> Self {
        Self { result }
    }

    /// No reference store configured: every query goes to the fallback template.
    pub fn fallback() -> Self {
        Self::new(RetrievalResult::fallback())
    }
}

#[async_trait]
impl ContextRetriever for StaticRetriever {
    async fn retrieve(&self, _query: &str) -> Result<RetrievalResult, RagError> {
        Ok(self.result.clone())
    }
}
