use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use super::completion::{stream_completion, CompletionError};
use super::medical_context::build_medical_context;
use super::prompt::compose_system_prompt;
use super::retrieval::filter_relevant;
use super::stream::{RecordSink, StreamRecord, RECORD_CHANNEL_CAPACITY};
use super::types::{ChatModel, CompletionRequest, ContextRetriever, RetrievalResult};
use super::validate::ValidatedChat;
use super::{classify_failure, RagError, GENERIC_FAILURE_TEXT};
use crate::config::ChatConfig;
use crate::core_state::CoreState;
use crate::profile_store::ProfileStore;

// ═══════════════════════════════════════════════════════════
// Pipeline
// ═══════════════════════════════════════════════════════════

/// One chat request end to end.
///
/// context + retrieval (joined) → filter → compose → stream → terminal record.
pub struct ChatPipeline<'a> {
    config: &'a ChatConfig,
    model: &'a dyn ChatModel,
    retriever: &'a dyn ContextRetriever,
    profiles: &'a dyn ProfileStore,
}

impl<'a> ChatPipeline<'a> {
    pub fn new(core: &'a CoreState) -> Self {
        Self {
            config: &core.config,
            model: core.model.as_ref(),
            retriever: core.retriever.as_ref(),
            profiles: core.profiles.as_ref(),
        }
    }

    /// Run the pipeline, writing every record to `sink`.
    ///
    /// Always ends the stream with exactly one terminal record unless the
    /// client is already gone.
    pub async fn run(&self, chat: ValidatedChat, sink: RecordSink) {
        let (medical_context, retrieval) = tokio::join!(
            build_medical_context(self.profiles, chat.user_id.as_deref()),
            self.retriever.retrieve(&chat.message),
        );

        let retrieval = retrieval.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Context retrieval failed, using fallback prompt");
            RetrievalResult::fallback()
        });
        let candidates = retrieval.items.len();
        let filtered = filter_relevant(retrieval, self.config.similarity_threshold);
        tracing::debug!(
            candidates,
            kept = filtered.items.len(),
            fallback = filtered.fallback_needed,
            "Retrieval filtered"
        );

        let prompt = compose_system_prompt(
            &self.config.prompt_templates,
            &filtered,
            &medical_context,
        );
        tracing::debug!(
            kind = ?prompt.kind,
            context_items = prompt.context_items,
            personalized = !medical_context.is_empty(),
            "System prompt composed"
        );

        let request = CompletionRequest {
            system_prompt: prompt.system,
            user_message: chat.message,
            model: self.config.model.clone(),
            max_output_tokens: self.config.max_output_tokens,
        };

        match stream_completion(self.model, &request, &sink).await {
            Ok(usage) => {
                tracing::info!(
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    estimated = usage.estimated,
                    "Chat stream completed"
                );
                if sink.finish(usage).await.is_err() {
                    tracing::info!("Client disconnected before token info");
                }
            }
            Err(CompletionError::Disconnected(_)) => {
                tracing::info!("Client disconnected mid-stream");
            }
            Err(CompletionError::Model(e)) => {
                let err = RagError::from(e);
                let class = classify_failure(&err);
                tracing::warn!(error = %err, class = ?class, "Chat generation failed");
                if sink.fail(class.user_message()).await.is_err() {
                    tracing::info!("Client disconnected before error record");
                }
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Task supervision
// ═══════════════════════════════════════════════════════════

/// Start a chat pipeline on its own task and return the record receiver.
///
/// A supervisor task aborts the pipeline when the receiver is dropped, and
/// turns a pipeline panic into the generic error record.
pub fn spawn_chat_stream(
    core: Arc<CoreState>,
    chat: ValidatedChat,
) -> mpsc::Receiver<StreamRecord> {
    let (tx, rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("chat", %request_id);

    span.in_scope(|| {
        tracing::info!(
            message_chars = chat.message.chars().count(),
            identified = chat.user_id.is_some(),
            "Chat request accepted"
        );
    });

    let sink = RecordSink::new(tx.clone());
    let worker = tokio::spawn(
        async move {
            ChatPipeline::new(&core).run(chat, sink).await;
        }
        .instrument(span.clone()),
    );
    tokio::spawn(supervise(worker, tx).instrument(span));

    rx
}

async fn supervise(mut worker: JoinHandle<()>, tx: mpsc::Sender<StreamRecord>) {
    tokio::select! {
        result = &mut worker => {
            if let Err(e) = result {
                if e.is_panic() {
                    tracing::error!("Chat pipeline panicked");
                    let _ = tx
                        .send(StreamRecord::Error(GENERIC_FAILURE_TEXT.to_string()))
                        .await;
                }
            }
        }
        _ = tx.closed() => {
            worker.abort();
            tracing::info!("Client disconnected, chat pipeline cancelled");
        }
    }
}
