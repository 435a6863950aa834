//! Process-wide application state.
//!
//! `CoreState` is built once in `main` and shared as `Arc<CoreState>` by every
//! request. It holds only read-only configuration and collaborator handles;
//! per-request state lives in the chat pipeline task.

use std::sync::Arc;

use crate::config::ChatConfig;
use crate::pipeline::rag::openai::OpenAiChatModel;
use crate::pipeline::rag::retrieval::{HttpContextRetriever, StaticRetriever};
use crate::pipeline::rag::types::{ChatModel, ContextRetriever};
use crate::profile_store::{collaborator_http_client, HttpProfileStore, NoProfileStore, ProfileStore};

pub struct CoreState {
    pub config: ChatConfig,
    /// Streaming chat-generation provider.
    pub model: Arc<dyn ChatModel>,
    /// Semantic search over reference content.
    pub retriever: Arc<dyn ContextRetriever>,
    /// User health profile lookup.
    pub profiles: Arc<dyn ProfileStore>,
}

impl CoreState {
    pub fn new(
        config: ChatConfig,
        model: Arc<dyn ChatModel>,
        retriever: Arc<dyn ContextRetriever>,
        profiles: Arc<dyn ProfileStore>,
    ) -> Self {
        Self {
            config,
            model,
            retriever,
            profiles,
        }
    }

    /// Wire the HTTP collaborators named by `config`.
    ///
    /// Unset retriever or profile URLs fall back to offline stand-ins so the
    /// service still answers (fallback prompt, no personalization).
    pub fn from_config(config: ChatConfig) -> Self {
        let client = collaborator_http_client();

        let model: Arc<dyn ChatModel> = Arc::new(OpenAiChatModel::new(
            &config.openai_base_url,
            config.openai_api_key.clone(),
            client.clone(),
        ));
        if config.openai_api_key.is_none() {
            tracing::warn!("OPENAI_API_KEY not set, chat requests will fail");
        }

        let retriever: Arc<dyn ContextRetriever> = match &config.retriever_url {
            Some(url) => Arc::new(HttpContextRetriever::new(url, client.clone())),
            None => {
                tracing::warn!("RETRIEVER_URL not set, every answer uses the fallback prompt");
                Arc::new(StaticRetriever::fallback())
            }
        };

        let profiles: Arc<dyn ProfileStore> = match &config.profile_store_url {
            Some(url) => Arc::new(HttpProfileStore::new(url, client)),
            None => {
                tracing::info!("PROFILE_STORE_URL not set, answers are not personalized");
                Arc::new(NoProfileStore)
            }
        };

        Self::new(config, model, retriever, profiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::rag::types::CompletionRequest;
    use crate::pipeline::rag::ModelError;

    #[tokio::test]
    async fn unconfigured_collaborators_degrade() {
        let core = CoreState::from_config(ChatConfig::default());

        let result = core.retriever.retrieve("Huyết áp cao?").await.unwrap();
        assert!(result.fallback_needed);
        assert!(core.profiles.fetch_profile("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_api_key_surfaces_from_model() {
        let core = CoreState::from_config(ChatConfig::default());
        let request = CompletionRequest {
            system_prompt: String::new(),
            user_message: "hi".into(),
            model: core.config.model.clone(),
            max_output_tokens: core.config.max_output_tokens,
        };
        let err = core.model.stream_chat(&request).await.err().unwrap();
        assert!(matches!(err, ModelError::MissingApiKey));
    }

    #[test]
    fn shares_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CoreState>();
    }
}
