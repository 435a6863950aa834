//! Newline-delimited JSON record stream returned by the chat endpoint.
//!
//! Every response that opens a stream carries zero or more `content` records
//! followed by exactly one terminal record (`token_info` or `error`).

use std::convert::Infallible;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::StreamExt;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::types::TokenUsage;
use super::{RagError, GENERIC_FAILURE_TEXT};

/// Records buffered between the pipeline task and the response body.
pub const RECORD_CHANNEL_CAPACITY: usize = 64;

/// One line of the response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamRecord {
    Content(String),
    TokenInfo(TokenUsage),
    Error(String),
}

impl StreamRecord {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamRecord::Content(_))
    }

    /// Serialize as one `\n`-terminated JSON line.
    pub fn to_line(&self) -> Result<String, RagError> {
        let mut line =
            serde_json::to_string(self).map_err(|e| RagError::Encoding(e.to_string()))?;
        line.push('\n');
        Ok(line)
    }

    /// Body frame for this record. An unencodable record becomes the generic
    /// error line so the client still sees valid JSON.
    pub fn encode(&self) -> Bytes {
        match self.to_line() {
            Ok(line) => Bytes::from(line),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode stream record");
                Bytes::from(format!(
                    "{{\"type\":\"error\",\"data\":\"{GENERIC_FAILURE_TEXT}\"}}\n"
                ))
            }
        }
    }
}

/// The response body has been dropped: the client went away.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Stream receiver disconnected")]
pub struct Disconnected;

/// The only writer of a response stream.
///
/// Terminal records consume the sink, so a stream can end only once.
pub struct RecordSink {
    tx: mpsc::Sender<StreamRecord>,
}

impl RecordSink {
    pub fn new(tx: mpsc::Sender<StreamRecord>) -> Self {
        Self { tx }
    }

    pub async fn content(&self, text: &str) -> Result<(), Disconnected> {
        self.send(StreamRecord::Content(text.to_string())).await
    }

    pub async fn finish(self, usage: TokenUsage) -> Result<(), Disconnected> {
        self.send(StreamRecord::TokenInfo(usage)).await
    }

    pub async fn fail(self, message: &str) -> Result<(), Disconnected> {
        self.send(StreamRecord::Error(message.to_string())).await
    }

    async fn send(&self, record: StreamRecord) -> Result<(), Disconnected> {
        self.tx.send(record).await.map_err(|_| Disconnected)
    }
}

/// Wrap the receiving end of a record channel as a streaming 200 response.
///
/// Each record is flushed as its own body frame; the body ends when every
/// sender is dropped.
pub fn record_stream_response(rx: mpsc::Receiver<StreamRecord>) -> Response {
    let frames = ReceiverStream::new(rx).map(|record| Ok::<_, Infallible>(record.encode()));

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache, no-transform"),
            (header::CONNECTION, "keep-alive"),
            (header::HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Body::from_stream(frames),
    )
        .into_response()
}
