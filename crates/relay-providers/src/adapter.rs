//! Capability set shared by every vendor adapter.

use async_trait::async_trait;
use relay_auth::CredentialKey;
use relay_core::{
    ChatMessage, ChatRequest, ChatResponse, ChatStream, HttpTransport, MessageRole, ProviderKind,
    RelayError, TransportRequest, TransportResponse,
};
use std::sync::Arc;

/// Per-call inputs supplied by the dispatcher
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Vendor credential of the selected channel
    pub credential: CredentialKey,
    /// Prompt token count computed by the caller
    pub prompt_tokens: u32,
}

impl CallContext {
    /// Context for `credential` with the given prompt count
    pub fn new(credential: impl Into<CredentialKey>, prompt_tokens: u32) -> Self {
        Self {
            credential: credential.into(),
            prompt_tokens,
        }
    }
}

/// Translation between the uniform schema and one vendor's native API
#[async_trait]
pub trait VendorAdapter: Send + Sync {
    /// Vendor family
    fn kind(&self) -> ProviderKind;

    /// Configured provider instance id
    fn id(&self) -> &str;

    /// Transport used for vendor calls
    fn transport(&self) -> &Arc<dyn HttpTransport>;

    /// Build the vendor call, resolving credentials as needed.
    ///
    /// # Errors
    /// Credential, model mapping or serialization failures
    async fn build_request(
        &self,
        request: &ChatRequest,
        ctx: &CallContext,
        stream: bool,
    ) -> Result<TransportRequest, RelayError>;

    /// Translate a successful (2xx) non-streaming body.
    ///
    /// # Errors
    /// `Upstream` for vendor error envelopes or empty results, `Translation`
    /// for undecodable payloads
    fn translate_response(
        &self,
        status: u16,
        body: &[u8],
        request: &ChatRequest,
        ctx: &CallContext,
    ) -> Result<ChatResponse, RelayError>;

    /// Translate a non-2xx response body
    fn translate_error(&self, status: u16, body: &[u8]) -> RelayError;

    /// Turn a successful upstream response into the caller-facing stream
    fn translate_stream(
        &self,
        response: TransportResponse,
        request: &ChatRequest,
        ctx: &CallContext,
    ) -> ChatStream;
}

/// Error for a non-2xx body no vendor envelope matched
pub(crate) fn fallback_error(status: u16, body: &[u8]) -> RelayError {
    let text = String::from_utf8_lossy(body);
    let message = if text.trim().is_empty() {
        format!("HTTP {status}")
    } else {
        text.trim().to_string()
    };
    RelayError::upstream(status, message, "upstream_error", None)
}

/// Role/content pair for vendors that accept only user and assistant turns.
///
/// A system message becomes a user turn followed by an assistant "Okay".
pub(crate) fn fold_system_messages(messages: &[ChatMessage]) -> Vec<(&'static str, String)> {
    let mut folded = Vec::with_capacity(messages.len());
    for message in messages {
        match message.role {
            MessageRole::System => {
                folded.push(("user", message.text()));
                folded.push(("assistant", "Okay".to_string()));
            }
            MessageRole::Assistant => folded.push(("assistant", message.text())),
            MessageRole::User | MessageRole::Tool => folded.push(("user", message.text())),
        }
    }
    folded
}
