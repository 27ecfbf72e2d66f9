//! Incremental translation of genuinely streaming vendor responses.

use async_stream::stream;
use futures::StreamExt;
use relay_core::{
    ChatChunk, ChatStream, FinishReason, RelayError, ReportedUsage, SseDecoder, SseEvent,
    SseFrame, TokenCounter, TransportResponse, Usage, UsageHandle,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of translating one upstream event
#[derive(Debug)]
pub enum StreamEvent {
    /// A content fragment
    Delta {
        /// Text fragment
        content: String,
        /// Whether this is the vendor's final event
        finished: bool,
        /// Usage block carried by the event
        usage: Option<ReportedUsage>,
    },
    /// Event carries nothing for the caller
    Skip,
    /// Vendor signalled an error mid-stream
    Fail(RelayError),
}

/// Maps one upstream SSE event to a [`StreamEvent`]
pub type EventTranslator = Box<dyn FnMut(&SseEvent) -> StreamEvent + Send + 'static>;

/// Settings of one translated stream
pub struct SseTranslation {
    /// Vendor name for logs
    pub provider: &'static str,
    /// Model reported in chunks
    pub model: String,
    /// Prompt tokens computed by the caller
    pub prompt_tokens: u32,
    /// Completion token estimator used when the vendor reports none
    pub counter: Arc<dyn TokenCounter>,
}

impl SseTranslation {
    /// Translate an upstream SSE body into uniform chunk frames.
    ///
    /// Each content event becomes one `data:` frame; the stream always ends
    /// with `data: [DONE]`, including after read or vendor errors.
    pub fn run(self, response: TransportResponse, mut translate: EventTranslator) -> ChatStream {
        let (usage_tx, usage) = UsageHandle::channel();
        let id = relay_core::completion_id();
        let created = chrono::Utc::now().timestamp();
        let Self {
            provider,
            model,
            prompt_tokens,
            counter,
        } = self;

        let frames = stream! {
            let mut body = response.body;
            let mut decoder = SseDecoder::new();
            let mut text = String::new();
            let mut reported: Option<ReportedUsage> = None;
            let mut finished = false;

            while !finished {
                let events = match body.next().await {
                    Some(Ok(bytes)) => decoder.push(&bytes),
                    Some(Err(e)) => {
                        warn!(provider, error = %e, "Upstream stream read failed");
                        break;
                    }
                    None => {
                        finished = true;
                        decoder.finish().into_iter().collect()
                    }
                };

                for event in events {
                    match translate(&event) {
                        StreamEvent::Delta { content, finished: last, usage } => {
                            text.push_str(&content);
                            if usage.is_some() {
                                reported = usage;
                            }
                            let chunk = ChatChunk::delta(
                                id.as_str(),
                                created,
                                model.as_str(),
                                Some(content),
                                last.then_some(FinishReason::Stop),
                            );
                            match serde_json::to_string(&chunk) {
                                Ok(json) => yield SseFrame::Data(json),
                                Err(e) => warn!(provider, error = %e, "Failed to encode chunk"),
                            }
                            if last {
                                finished = true;
                                break;
                            }
                        }
                        StreamEvent::Skip => {}
                        StreamEvent::Fail(e) => {
                            warn!(provider, error = %e, "Vendor reported a stream error");
                            finished = true;
                            break;
                        }
                    }
                }
            }

            let usage = Usage::reconcile(reported.as_ref(), prompt_tokens, || {
                if text.is_empty() {
                    0
                } else {
                    counter.count_tokens(&text, &model)
                }
            });
            debug!(provider, completion_tokens = usage.completion_tokens, "Stream finished");
            usage_tx.send(usage);

            yield SseFrame::Done;
        };

        ChatStream::new(Box::pin(frames), usage)
    }
}

impl std::fmt::Debug for SseTranslation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseTranslation")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}
