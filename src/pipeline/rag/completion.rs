use futures_util::StreamExt;
use thiserror::Error;

use super::stream::{Disconnected, RecordSink};
use super::types::{ChatModel, CompletionRequest, ModelEvent, TokenUsage, Usage};
use super::ModelError;

/// Characters per token used when the provider reports no usage.
const CHARS_PER_TOKEN: usize = 4;

#[derive(Error, Debug)]
pub enum CompletionError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Disconnected(#[from] Disconnected),
}

/// Stream one generation into `sink` as `content` records and return the
/// usage for the terminal record.
///
/// The upstream stream is dropped as soon as it signals finish or the client
/// disconnects. The terminal record itself is left to the caller.
pub async fn stream_completion(
    model: &dyn ChatModel,
    request: &CompletionRequest,
    sink: &RecordSink,
) -> Result<TokenUsage, CompletionError> {
    let mut stream = model.stream_chat(request).await?;
    let mut accumulated = String::new();
    let mut reported: Option<Usage> = None;

    while let Some(event) = stream.next().await {
        match event? {
            ModelEvent::Delta(text) => {
                if text.is_empty() {
                    continue;
                }
                accumulated.push_str(&text);
                sink.content(&text).await?;
            }
            ModelEvent::Usage(usage) => reported = Some(usage),
            ModelEvent::Finished { usage } => {
                reported = usage.or(reported);
                break;
            }
        }
    }
    drop(stream);

    Ok(resolve_usage(reported, request, &accumulated))
}

/// Upstream usage when it carries any counts, otherwise the estimate.
pub fn resolve_usage(
    reported: Option<Usage>,
    request: &CompletionRequest,
    accumulated: &str,
) -> TokenUsage {
    match reported {
        Some(usage) if !usage.is_empty() => TokenUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.prompt_tokens.saturating_add(usage.completion_tokens),
            estimated: false,
        },
        _ => estimate_usage(&request.system_prompt, &request.user_message, accumulated),
    }
}

/// `ceil(chars / 4)` on each side.
///
/// Characters are Unicode scalar values, so astral-plane text (emoji) counts
/// one per symbol where a UTF-16 length would count two.
pub fn estimate_usage(system_prompt: &str, message: &str, output: &str) -> TokenUsage {
    let input_chars = system_prompt.chars().count() + message.chars().count();
    let input_tokens = to_tokens(input_chars);
    let output_tokens = to_tokens(output.chars().count());
    TokenUsage {
        input_tokens,
        output_tokens,
        total_tokens: input_tokens.saturating_add(output_tokens),
        estimated: true,
    }
}

fn to_tokens(chars: usize) -> u32 {
    u32::try_from(chars.div_ceil(CHARS_PER_TOKEN)).unwrap_or(u32::MAX)
}
