//! Streaming emulation for vendors that only return one complete response.
//!
//! A worker task reads the whole upstream body, decodes it and hands at most
//! one encoded chunk to the writer over a single-slot channel, followed by
//! [`Handoff::Finished`]. The writer yields the chunk (if any) and then
//! always `data: [DONE]`, so a caller never sees a partial frame.

use async_stream::stream;
use relay_core::{
    ChatChunk, ChatStream, FinishReason, RelayError, SseFrame, TokenCounter, TransportResponse,
    Usage, UsageHandle,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Messages from the emulation worker to the writer
#[derive(Debug)]
enum Handoff {
    /// Encoded `chat.completion.chunk` JSON
    Chunk(String),
    /// No more chunks will follow
    Finished,
}

/// Decodes a complete vendor body into the first candidate's text.
///
/// `Ok(None)` means the vendor returned no candidates.
pub type CandidateDecoder =
    Box<dyn FnOnce(&[u8]) -> Result<Option<String>, RelayError> + Send + 'static>;

/// Inputs of one emulated stream
pub struct EmulatedStream {
    /// Model reported in chunks and used for token estimation
    pub model: String,
    /// Prompt tokens computed by the caller
    pub prompt_tokens: u32,
    /// Completion token estimator
    pub counter: Arc<dyn TokenCounter>,
}

impl EmulatedStream {
    /// Spawn the worker and return the caller-facing stream.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(self, response: TransportResponse, decode: CandidateDecoder) -> ChatStream {
        let (tx, mut rx) = mpsc::channel::<Handoff>(1);
        let (usage_tx, usage) = UsageHandle::channel();

        let id = relay_core::completion_id();
        let created = chrono::Utc::now().timestamp();
        let Self {
            model,
            prompt_tokens,
            counter,
        } = self;

        tokio::spawn(async move {
            let streamed = match response.bytes().await {
                Ok(body) => match decode(&body) {
                    Ok(Some(content)) => {
                        let chunk = ChatChunk::delta(
                            id,
                            created,
                            model.as_str(),
                            Some(content.clone()),
                            Some(FinishReason::Stop),
                        );
                        match serde_json::to_string(&chunk) {
                            Ok(json) => {
                                if tx.send(Handoff::Chunk(json)).await.is_err() {
                                    debug!("Stream writer dropped before chunk delivery");
                                }
                                content
                            }
                            Err(e) => {
                                error!(error = %e, "Failed to encode stream chunk");
                                String::new()
                            }
                        }
                    }
                    Ok(None) => {
                        debug!(model = %model, "Vendor returned no candidates");
                        String::new()
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to decode vendor response");
                        String::new()
                    }
                },
                Err(e) => {
                    error!(error = %e, "Failed to read vendor response");
                    String::new()
                }
            };

            let _ = tx.send(Handoff::Finished).await;

            let completion_tokens = if streamed.is_empty() {
                0
            } else {
                counter.count_tokens(&streamed, &model)
            };
            usage_tx.send(Usage::new(prompt_tokens, completion_tokens));
        });

        let frames = stream! {
            while let Some(message) = rx.recv().await {
                match message {
                    Handoff::Chunk(json) => yield SseFrame::Data(json),
                    Handoff::Finished => break,
                }
            }
            yield SseFrame::Done;
        };

        ChatStream::new(Box::pin(frames), usage)
    }
}

impl std::fmt::Debug for EmulatedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmulatedStream")
            .field("model", &self.model)
            .field("prompt_tokens", &self.prompt_tokens)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::EstimatingTokenCounter;

    fn emulator() -> EmulatedStream {
        EmulatedStream {
            model: "chat-bison-001".to_string(),
            prompt_tokens: 7,
            counter: Arc::new(EstimatingTokenCounter::default()),
        }
    }

    #[tokio::test]
    async fn test_single_chunk_then_done() {
        let stream = emulator().spawn(
            TransportResponse::from_bytes(200, "ignored"),
            Box::new(|_: &[u8]| Ok(Some("hello".to_string()))),
        );

        let (frames, usage) = stream.collect().await;

        assert_eq!(frames.len(), 2);
        let chunk: ChatChunk = serde_json::from_str(frames[0].data()).expect("chunk json");
        assert_eq!(chunk.first_content(), Some("hello"));
        assert_eq!(chunk.model, "chat-bison-001");
        assert!(chunk.id.starts_with("chatcmpl-"));
        assert_eq!(chunk.choices[0].finish_reason, Some(FinishReason::Stop));
        assert!(frames[1].is_done());
        assert_eq!(usage, Some(Usage::new(7, 2)));
    }

    #[tokio::test]
    async fn test_no_candidates_only_done() {
        let stream = emulator().spawn(
            TransportResponse::from_bytes(200, "{}"),
            Box::new(|_: &[u8]| Ok(None)),
        );

        let (frames, usage) = stream.collect().await;

        assert_eq!(frames, vec![SseFrame::Done]);
        assert_eq!(usage, Some(Usage::new(7, 0)));
    }

    #[tokio::test]
    async fn test_decode_failure_only_done() {
        let stream = emulator().spawn(
            TransportResponse::from_bytes(200, "not json"),
            Box::new(|_: &[u8]| Err(RelayError::translation("bad payload"))),
        );

        let (frames, _) = stream.collect().await;
        assert_eq!(frames, vec![SseFrame::Done]);
    }

    #[tokio::test]
    async fn test_body_read_failure_only_done() {
        use futures::StreamExt;

        let response = TransportResponse {
            status: 200,
            body: futures::stream::once(async { Err(RelayError::transport("reset")) }).boxed(),
        };
        let stream = emulator().spawn(response, Box::new(|_: &[u8]| Ok(Some("never".to_string()))));

        let (frames, usage) = stream.collect().await;
        assert_eq!(frames, vec![SseFrame::Done]);
        assert_eq!(usage.map(|u| u.completion_tokens), Some(0));
    }
}
