//! Chat API router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Routes are nested under `/api/`; a permissive CORS layer lets the browser
//! front-end call them from another origin.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Build the chat API router.
///
/// Any method other than `POST` on `/api/chat` answers 405.
pub fn chat_api_router(core: Arc<CoreState>) -> Router {
    let ctx = ApiContext::new(core);

    let api = Router::new()
        .route("/chat", post(endpoints::chat::send))
        .route("/health", get(endpoints::health::check))
        .with_state(ctx);

    Router::new()
        .nest("/api", api)
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::config::ChatConfig;
    use crate::pipeline::rag::retrieval::StaticRetriever;
    use crate::pipeline::rag::types::{
        ChatModel, CompletionRequest, ContextItem, ContextRetriever, DeltaStream, ModelEvent,
        RetrievalResult, Usage,
    };
    use crate::pipeline::rag::validate::{EMPTY_MESSAGE_TEXT, TOO_LONG_MESSAGE_TEXT};
    use crate::pipeline::rag::{ModelError, MISSING_CREDENTIALS_TEXT};
    use crate::models::UserMedicalProfile;
    use crate::pipeline::rag::RagError;
    use crate::profile_store::{NoProfileStore, ProfileLookupError, ProfileStore};

    struct CannedModel;

    #[async_trait]
    impl ChatModel for CannedModel {
        async fn stream_chat(
            &self,
            _request: &CompletionRequest,
        ) -> Result<DeltaStream, ModelError> {
            let events: Vec<Result<ModelEvent, ModelError>> = vec![
                Ok(ModelEvent::Delta("Nên giảm muối".into())),
                Ok(ModelEvent::Delta(" và tập thể dục.".into())),
                Ok(ModelEvent::Finished {
                    usage: Some(Usage {
                        prompt_tokens: 200,
                        completion_tokens: 12,
                    }),
                }),
            ];
            Ok(Box::pin(futures_util::stream::iter(events)))
        }
    }

    /// Stands in for every collaborator and counts each call made to it.
    #[derive(Clone, Default)]
    struct CallCounter(Arc<AtomicUsize>);

    impl CallCounter {
        fn calls(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }

        fn bump(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ChatModel for CallCounter {
        async fn stream_chat(
            &self,
            _request: &CompletionRequest,
        ) -> Result<DeltaStream, ModelError> {
            self.bump();
            Ok(Box::pin(futures_util::stream::iter(vec![Ok::<_, ModelError>(
                ModelEvent::Finished { usage: None },
            )])))
        }
    }

    #[async_trait]
    impl ContextRetriever for CallCounter {
        async fn retrieve(&self, _query: &str) -> Result<RetrievalResult, RagError> {
            self.bump();
            Ok(RetrievalResult::fallback())
        }
    }

    #[async_trait]
    impl ProfileStore for CallCounter {
        async fn fetch_profile(
            &self,
            _user_id: &str,
        ) -> Result<Option<UserMedicalProfile>, ProfileLookupError> {
            self.bump();
            Ok(None)
        }
    }

    fn counted_core(counter: &CallCounter) -> Arc<CoreState> {
        Arc::new(CoreState::new(
            ChatConfig::default(),
            Arc::new(counter.clone()),
            Arc::new(counter.clone()),
            Arc::new(counter.clone()),
        ))
    }

    fn test_core(model: Arc<dyn ChatModel>) -> Arc<CoreState> {
        let retriever = StaticRetriever::new(RetrievalResult {
            items: vec![ContextItem {
                id: "htn-1".into(),
                content: "Giảm muối giúp hạ huyết áp".into(),
                score: 0.8,
                source: None,
                topic: None,
                risk_level: None,
            }],
            fallback_needed: false,
        });
        Arc::new(CoreState::new(
            ChatConfig::default(),
            model,
            Arc::new(retriever),
            Arc::new(NoProfileStore),
        ))
    }

    fn post_chat(body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn chat_streams_ndjson_records() {
        let app = chat_api_router(test_core(Arc::new(CannedModel)));
        let body = serde_json::json!({"message": "Huyết áp cao nên ăn gì?", "userId": "anonymous"});
        let response = app.oneshot(post_chat(body.to_string())).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            "no-cache, no-transform"
        );

        let text = body_text(response).await;
        let records: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0]["type"], "content");
        assert_eq!(records[0]["data"], "Nên giảm muối");
        assert_eq!(records[1]["data"], " và tập thể dục.");
        assert_eq!(records[2]["type"], "token_info");
        assert_eq!(records[2]["data"]["input_tokens"], 200);
        assert_eq!(records[2]["data"]["output_tokens"], 12);
        assert_eq!(records[2]["data"]["total_tokens"], 212);
        assert_eq!(records[2]["data"]["estimated"], false);
    }

    #[tokio::test]
    async fn each_record_is_its_own_frame() {
        let app = chat_api_router(test_core(Arc::new(CannedModel)));
        let body = serde_json::json!({"message": "Ăn gì tốt cho tim?"});
        let response = app.oneshot(post_chat(body.to_string())).await.unwrap();

        let mut body = response.into_body();
        let frame = body.frame().await.unwrap().unwrap();
        let data = frame.into_data().unwrap();
        assert_eq!(&data[..], "{\"type\":\"content\",\"data\":\"Nên giảm muối\"}\n".as_bytes());
    }

    #[tokio::test]
    async fn too_long_message_is_rejected_before_streaming() {
        let counter = CallCounter::default();
        let app = chat_api_router(counted_core(&counter));
        let body = serde_json::json!({"message": "a".repeat(1001), "userId": "u1"});
        let response = app.oneshot(post_chat(body.to_string())).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, TOO_LONG_MESSAGE_TEXT);
        tokio::task::yield_now().await;
        assert_eq!(counter.calls(), 0);
    }

    #[tokio::test]
    async fn accepted_message_reaches_every_collaborator() {
        let counter = CallCounter::default();
        let app = chat_api_router(counted_core(&counter));
        let body = serde_json::json!({"message": "Ho khan?", "userId": "u1"});
        let response = app.oneshot(post_chat(body.to_string())).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let text = body_text(response).await;
        assert!(text.contains("\"token_info\""));
        assert_eq!(counter.calls(), 3);
    }

    #[tokio::test]
    async fn thousand_character_message_is_accepted() {
        let app = chat_api_router(test_core(Arc::new(CannedModel)));
        let body = serde_json::json!({"message": "ă".repeat(1000)});
        let response = app.oneshot(post_chat(body.to_string())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn blank_or_malformed_body_is_rejected() {
        let counter = CallCounter::default();
        for body in [
            serde_json::json!({"message": "   ", "userId": "u1"}).to_string(),
            serde_json::json!({"message": 42, "userId": "u1"}).to_string(),
            serde_json::json!({"userId": "u1"}).to_string(),
            "not json".to_string(),
        ] {
            let app = chat_api_router(counted_core(&counter));
            let response = app.oneshot(post_chat(body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(body_text(response).await, EMPTY_MESSAGE_TEXT);
        }
        tokio::task::yield_now().await;
        assert_eq!(counter.calls(), 0);
    }

    #[tokio::test]
    async fn get_on_chat_is_method_not_allowed() {
        let app = chat_api_router(test_core(Arc::new(CannedModel)));
        let request = Request::builder()
            .uri("/api/chat")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn missing_credentials_stream_single_error() {
        let core = Arc::new(CoreState::new(
            ChatConfig::default(),
            Arc::new(crate::pipeline::rag::openai::OpenAiChatModel::new(
                "http://127.0.0.1:9",
                None,
                reqwest::Client::new(),
            )),
            Arc::new(StaticRetriever::fallback()),
            Arc::new(NoProfileStore),
        ));
        let app = chat_api_router(core);
        let body = serde_json::json!({"message": "Đau bụng?"});
        let response = app.oneshot(post_chat(body.to_string())).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let text = body_text(response).await;
        assert_eq!(text.lines().count(), 1);
        assert!(text.ends_with('\n'));
        let record: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(
            record,
            serde_json::json!({"type": "error", "data": MISSING_CREDENTIALS_TEXT})
        );
    }

    #[tokio::test]
    async fn health_reports_model() {
        let app = chat_api_router(test_core(Arc::new(CannedModel)));
        let request = Request::builder()
            .uri("/api/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["model"], crate::config::DEFAULT_CHAT_MODEL);
    }

    #[tokio::test]
    async fn cors_preflight_is_allowed() {
        let app = chat_api_router(test_core(Arc::new(CannedModel)));
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/api/chat")
            .header(header::ORIGIN, "http://localhost:3000")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert!(response.status().is_success());
        assert!(response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }
}
