//! # Relay Core
//!
//! Core types, traits, and error handling for the LLM relay.
//!
//! This crate provides the foundational types shared by every vendor adapter:
//! - Uniform chat request, response and streaming chunk types
//! - The caller-facing SSE frame protocol
//! - The `RelayError` hierarchy
//! - The injected HTTP transport and token counting seams

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod provider;
pub mod request;
pub mod response;
pub mod sse;
pub mod streaming;
pub mod tokens;
pub mod transport;

// Re-export commonly used types
pub use error::{ErrorBody, ErrorDetail, RelayError, RelayResult};
pub use provider::ProviderKind;
pub use request::{
    ChatMessage, ChatRequest, ChatRequestBuilder, ContentPart, ImageUrl, MessageContent,
    MessageRole,
};
pub use response::{ChatResponse, Choice, FinishReason, ReportedUsage, ResponseMessage, Usage};
pub use sse::{SseDecoder, SseEvent};
pub use streaming::{
    ChatChunk, ChatStream, ChunkChoice, ChunkDelta, SseFrame, UsageHandle, UsageSender,
    DONE_SENTINEL,
};
pub use tokens::{EstimatingTokenCounter, TokenCounter};
pub use transport::{
    HttpTransport, ReqwestTransport, TransportConfig, TransportRequest, TransportResponse,
};

/// Fresh OpenAI-style completion identifier (`chatcmpl-<uuid>`)
#[must_use]
pub fn completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4())
}
