//! Streaming chat completions against an OpenAI-compatible endpoint.
//!
//! The response is a server-sent event body of `data: {chunk}` blocks ending
//! with `data: [DONE]`. Chunks are decoded into [`ModelEvent`]s; the usage
//! chunk that `stream_options.include_usage` appends after the finish chunk is
//! folded into [`ModelEvent::Finished`].
//!
//! Once a chunk carries `finish_reason`, later text is discarded and the body
//! is read only for the usage chunk, for at most [`FINISH_USAGE_GRACE`].

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use super::types::{ChatModel, CompletionRequest, DeltaStream, ModelEvent, Usage};
use super::ModelError;

/// How long to wait for the usage chunk after the finish signal. Past this the
/// stream finishes without provider usage.
pub const FINISH_USAGE_GRACE: Duration = Duration::from_millis(500);

// ═══════════════════════════════════════════════════════════
// Provider client
// ═══════════════════════════════════════════════════════════

/// Chat model handle. Built once at startup and shared by every request.
pub struct OpenAiChatModel {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiChatModel {
    pub fn new(base_url: &str, api_key: Option<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        }
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    stream: bool,
    stream_options: StreamOptions,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn stream_chat(&self, request: &CompletionRequest) -> Result<DeltaStream, ModelError> {
        let api_key = self.api_key.as_deref().ok_or(ModelError::MissingApiKey)?;

        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatCompletionRequest {
            model: &request.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_message,
                },
            ],
            max_tokens: request.max_output_tokens,
            stream: true,
            stream_options: StreamOptions { include_usage: true },
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let code = status.as_u16();
            return Err(match code {
                401 | 403 => ModelError::Unauthorized(code),
                429 => ModelError::RateLimited,
                _ => ModelError::Upstream {
                    status: code,
                    body: response.text().await.unwrap_or_default(),
                },
            });
        }

        Ok(decode_event_stream(response.bytes_stream()))
    }
}

// ═══════════════════════════════════════════════════════════
// Event decoding
// ═══════════════════════════════════════════════════════════

/// Turn a raw SSE byte stream into model events.
pub fn decode_event_stream<S>(body: S) -> DeltaStream
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    let state = DecodeState {
        body: Box::pin(body),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        usage: None,
        finish_seen: false,
        done: false,
    };

    Box::pin(futures_util::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(event) = st.pending.pop_front() {
                return Some((event, st));
            }
            if st.done {
                return None;
            }
            let next = if st.finish_seen {
                match tokio::time::timeout(FINISH_USAGE_GRACE, st.body.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        st.finish();
                        continue;
                    }
                }
            } else {
                st.body.next().await
            };
            match next {
                Some(Ok(chunk)) => {
                    st.decoder.push(&chunk);
                    while !st.done {
                        let Some(data) = st.decoder.next_data() else {
                            break;
                        };
                        st.handle_data(&data);
                    }
                }
                Some(Err(e)) => {
                    st.done = true;
                    st.pending
                        .push_back(Err(ModelError::StreamingError(e.to_string())));
                }
                None => {
                    if let Some(data) = st.decoder.take_remaining() {
                        st.handle_data(&data);
                    }
                    if !st.done {
                        st.finish();
                    }
                }
            }
        }
    }))
}

struct DecodeState {
    body: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<ModelEvent, ModelError>>,
    usage: Option<Usage>,
    finish_seen: bool,
    done: bool,
}

impl DecodeState {
    fn handle_data(&mut self, data: &str) {
        if data == "[DONE]" {
            self.finish();
            return;
        }

        let chunk: ChatCompletionChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                self.fail(ModelError::ResponseParsing(e.to_string()));
                return;
            }
        };

        if let Some(error) = chunk.error {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            self.fail(ModelError::StreamingError(message));
            return;
        }

        for choice in chunk.choices {
            if self.finish_seen {
                break;
            }
            if let Some(text) = choice.delta.and_then(|d| d.content) {
                self.pending.push_back(Ok(ModelEvent::Delta(text)));
            }
            if choice.finish_reason.is_some() {
                self.finish_seen = true;
            }
        }

        if let Some(wire) = chunk.usage {
            let usage = Usage {
                prompt_tokens: wire.prompt_tokens,
                completion_tokens: wire.completion_tokens,
            };
            self.usage = Some(usage);
            if self.finish_seen {
                self.finish();
            } else {
                self.pending.push_back(Ok(ModelEvent::Usage(usage)));
            }
        }
    }

    fn finish(&mut self) {
        self.done = true;
        self.pending
            .push_back(Ok(ModelEvent::Finished { usage: self.usage }));
    }

    fn fail(&mut self, err: ModelError) {
        self.done = true;
        self.pending.push_back(Err(err));
    }
}

// ═══════════════════════════════════════════════════════════
// SSE framing
// ═══════════════════════════════════════════════════════════

/// Splits an SSE byte stream into the `data` payload of each event block.
///
/// Buffers raw bytes so multi-byte characters split across network chunks
/// are decoded intact.
pub(crate) struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.pending.extend(chunk.iter().copied().filter(|b| *b != b'\r'));
    }

    /// Next complete block's data, skipping blocks without `data:` lines.
    pub fn next_data(&mut self) -> Option<String> {
        loop {
            let pos = self.pending.windows(2).position(|w| w == b"\n\n")?;
            let block: Vec<u8> = self.pending.drain(..pos + 2).collect();
            if let Some(data) = block_data(&block[..pos]) {
                return Some(data);
            }
        }
    }

    /// Data of a final block that was not followed by a blank line.
    pub fn take_remaining(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        block_data(&rest)
    }
}

fn block_data(block: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(block);
    let lines: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}
