//! Streaming types: `chat.completion.chunk` objects, the Server-Sent-Events
//! frames they are written as, and the [`ChatStream`] handed back to callers.

use crate::error::RelayError;
use crate::request::MessageRole;
use crate::response::{FinishReason, Usage};
use bytes::Bytes;
use futures::stream::{BoxStream, Stream};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Payload of the terminal SSE frame
pub const DONE_SENTINEL: &str = "[DONE]";

/// Uniform streaming chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChunk {
    /// Response identifier, shared by every chunk of one stream
    pub id: String,
    /// Always `chat.completion.chunk`
    pub object: String,
    /// Unix timestamp (seconds), shared by every chunk of one stream
    pub created: i64,
    /// Model name
    pub model: String,
    /// Chunk choices
    pub choices: Vec<ChunkChoice>,
}

impl ChatChunk {
    /// Chunk with a single delta choice at index 0
    #[must_use]
    pub fn delta(
        id: impl Into<String>,
        created: i64,
        model: impl Into<String>,
        content: Option<String>,
        finish_reason: Option<FinishReason>,
    ) -> Self {
        Self {
            id: id.into(),
            object: "chat.completion.chunk".to_string(),
            created,
            model: model.into(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    role: Some(MessageRole::Assistant),
                    content,
                },
                finish_reason,
            }],
        }
    }

    /// Delta content of the first choice
    #[must_use]
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.delta.content.as_deref())
    }
}

/// Choice inside a streaming chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    /// Choice index
    pub index: u32,
    /// Incremental content
    pub delta: ChunkDelta,
    /// Set on the final chunk of a choice
    pub finish_reason: Option<FinishReason>,
}

/// Incremental message content
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkDelta {
    /// Author role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<MessageRole>,
    /// Text fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// One Server-Sent-Events frame of the caller-facing protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// `data: <json>`
    Data(String),
    /// `data: [DONE]`
    Done,
}

impl SseFrame {
    /// Encode a value as a data frame
    ///
    /// # Errors
    /// Returns a translation error if the value cannot be serialized
    pub fn json<T: Serialize>(value: &T) -> Result<Self, RelayError> {
        Ok(Self::Data(serde_json::to_string(value)?))
    }

    /// Frame payload, `[DONE]` for the terminal frame
    #[must_use]
    pub fn data(&self) -> &str {
        match self {
            Self::Data(data) => data,
            Self::Done => DONE_SENTINEL,
        }
    }

    /// Whether this is the terminal frame
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Wire encoding: `data: <payload>\n\n`
    #[must_use]
    pub fn encode(&self) -> Bytes {
        Bytes::from(format!("data: {}\n\n", self.data()))
    }
}

impl std::fmt::Display for SseFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "data: {}", self.data())
    }
}

/// Receives the usage counters of a stream once it has finished
#[derive(Debug)]
pub struct UsageHandle {
    rx: oneshot::Receiver<Usage>,
}

/// Producer side of a [`UsageHandle`]
#[derive(Debug)]
pub struct UsageSender {
    tx: oneshot::Sender<Usage>,
}

impl UsageHandle {
    /// Create a connected sender/handle pair
    #[must_use]
    pub fn channel() -> (UsageSender, Self) {
        let (tx, rx) = oneshot::channel();
        (UsageSender { tx }, Self { rx })
    }

    /// Handle that is already resolved
    #[must_use]
    pub fn ready(usage: Usage) -> Self {
        let (tx, handle) = Self::channel();
        tx.send(usage);
        handle
    }

    /// Wait for the usage counters.
    ///
    /// Returns `None` if the producer went away without reporting, e.g. the
    /// stream was dropped before it finished.
    pub async fn wait(self) -> Option<Usage> {
        self.rx.await.ok()
    }
}

impl UsageSender {
    /// Report the final counters; a dropped handle is not an error
    pub fn send(self, usage: Usage) {
        let _ = self.tx.send(usage);
    }
}

/// A caller-facing SSE stream plus its deferred usage counters
pub struct ChatStream {
    frames: BoxStream<'static, SseFrame>,
    usage: UsageHandle,
}

impl ChatStream {
    /// Wrap a frame stream and its usage handle
    #[must_use]
    pub fn new(frames: BoxStream<'static, SseFrame>, usage: UsageHandle) -> Self {
        Self { frames, usage }
    }

    /// Split into frames and usage handle
    #[must_use]
    pub fn into_parts(self) -> (BoxStream<'static, SseFrame>, UsageHandle) {
        (self.frames, self.usage)
    }

    /// Drain every frame, then wait for usage
    pub async fn collect(self) -> (Vec<SseFrame>, Option<Usage>) {
        use futures::StreamExt;

        let (frames, usage) = self.into_parts();
        let frames = frames.collect::<Vec<_>>().await;
        (frames, usage.wait().await)
    }
}

impl std::fmt::Debug for ChatStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStream").finish_non_exhaustive()
    }
}

impl Stream for ChatStream {
    type Item = SseFrame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.frames.as_mut().poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_frame_encoding() {
        assert_eq!(
            SseFrame::Data("{\"a\":1}".to_string()).encode(),
            Bytes::from_static(b"data: {\"a\":1}\n\n")
        );
        assert_eq!(SseFrame::Done.encode(), Bytes::from_static(b"data: [DONE]\n\n"));
        assert_eq!(SseFrame::Done.to_string(), "data: [DONE]");
    }

    #[test]
    fn test_chunk_shape() {
        let chunk = ChatChunk::delta(
            "chatcmpl-1",
            1_700_000_000,
            "chat-bison-001",
            Some("hello".to_string()),
            Some(FinishReason::Stop),
        );
        let frame = SseFrame::json(&chunk).expect("encode");
        let json: serde_json::Value = serde_json::from_str(frame.data()).expect("json");

        assert_eq!(json["object"], "chat.completion.chunk");
        assert_eq!(json["choices"][0]["delta"]["content"], "hello");
        assert_eq!(json["choices"][0]["delta"]["role"], "assistant");
        assert_eq!(json["choices"][0]["finish_reason"], "stop");
    }

    #[tokio::test]
    async fn test_usage_handle_dropped_sender() {
        let (tx, handle) = UsageHandle::channel();
        drop(tx);
        assert!(handle.wait().await.is_none());
    }

    #[tokio::test]
    async fn test_chat_stream_collect() {
        let frames = futures::stream::iter(vec![SseFrame::Data("{}".into()), SseFrame::Done]);
        let stream = ChatStream::new(frames.boxed(), UsageHandle::ready(Usage::new(1, 2)));

        let (frames, usage) = stream.collect().await;
        assert_eq!(frames.len(), 2);
        assert!(frames[1].is_done());
        assert_eq!(usage, Some(Usage::new(1, 2)));
    }
}
