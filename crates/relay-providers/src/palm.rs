//! Google PaLM (`generateMessage`) provider implementation.
//!
//! PaLM has no streaming endpoint, so streaming callers are served by the
//! [`EmulatedStream`] bridge: one complete call, one chunk, then `[DONE]`.

use crate::adapter::{fallback_error, CallContext, VendorAdapter};
use crate::emulator::EmulatedStream;
use async_trait::async_trait;
use relay_core::{
    ChatRequest, ChatResponse, ChatStream, Choice, EstimatingTokenCounter, HttpTransport,
    MessageRole, ProviderKind, RelayError, TokenCounter, TransportRequest, TransportResponse,
    Usage,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Default API host
pub const DEFAULT_PALM_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const CHAT_PATH: &str = "/v1beta2/models/chat-bison-001:generateMessage";

/// PaLM provider configuration
#[derive(Debug, Clone)]
pub struct PalmConfig {
    /// Provider instance ID
    pub id: String,
    /// API host
    pub base_url: String,
}

impl PalmConfig {
    /// Configuration with the default host
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base_url: DEFAULT_PALM_BASE_URL.to_string(),
        }
    }

    /// Override the API host
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Google PaLM chat provider; the call credential is the API key itself
pub struct PalmProvider {
    config: PalmConfig,
    transport: Arc<dyn HttpTransport>,
    counter: Arc<dyn TokenCounter>,
}

impl PalmProvider {
    /// Create a provider
    pub fn new(config: PalmConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            config,
            transport,
            counter: Arc::new(EstimatingTokenCounter::default()),
        }
    }

    /// Replace the token counter
    #[must_use]
    pub fn with_token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    /// Transform a uniform request to PaLM's format
    fn transform_request(request: &ChatRequest) -> PalmChatRequest {
        PalmChatRequest {
            prompt: PalmPrompt {
                messages: request
                    .messages
                    .iter()
                    .map(|message| PalmMessage {
                        author: if message.role == MessageRole::User {
                            "0".to_string()
                        } else {
                            "1".to_string()
                        },
                        content: message.text(),
                    })
                    .collect(),
            },
            temperature: request.temperature,
            candidate_count: request.n,
            top_p: request.top_p,
            top_k: request.top_k,
        }
    }

    fn chat_url(&self, api_key: &str) -> Result<String, RelayError> {
        let base = self.config.base_url.trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}{CHAT_PATH}"))
            .map_err(|e| RelayError::configuration(format!("Invalid PaLM base URL: {e}")))?;
        url.query_pairs_mut().append_pair("key", api_key);
        Ok(url.into())
    }

    fn upstream_error(status: u16, error: PalmError) -> RelayError {
        RelayError::upstream(status, error.message, error.status, Some(error.code.to_string()))
    }

    /// First candidate's text of a complete body; `None` for zero candidates
    fn first_candidate(body: &[u8]) -> Result<Option<String>, RelayError> {
        let response: PalmChatResponse = serde_json::from_slice(body)?;
        if let Some(error) = response.error.filter(|e| e.code != 0) {
            return Err(Self::upstream_error(200, error));
        }
        Ok(response.candidates.into_iter().next().map(|c| c.content))
    }
}

impl std::fmt::Debug for PalmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PalmProvider")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl VendorAdapter for PalmProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Palm
    }

    fn id(&self) -> &str {
        &self.config.id
    }

    fn transport(&self) -> &Arc<dyn HttpTransport> {
        &self.transport
    }

    async fn build_request(
        &self,
        request: &ChatRequest,
        ctx: &CallContext,
        stream: bool,
    ) -> Result<TransportRequest, RelayError> {
        let api_key = ctx.credential.as_str();
        if api_key.trim().is_empty() {
            return Err(RelayError::malformed_credential("PaLM API key is empty"));
        }
        let url = self.chat_url(api_key)?;

        debug!(provider = "palm", model = %request.model, stream, "Built chat request");

        // The vendor call is never streaming; `stream` only changes the Accept header
        TransportRequest::post(url)
            .header(
                "Accept",
                if stream {
                    "text/event-stream"
                } else {
                    "application/json"
                },
            )
            .json(&Self::transform_request(request))
    }

    fn translate_response(
        &self,
        status: u16,
        body: &[u8],
        request: &ChatRequest,
        ctx: &CallContext,
    ) -> Result<ChatResponse, RelayError> {
        let response: PalmChatResponse = serde_json::from_slice(body)?;

        let error = response.error.unwrap_or_default();
        if error.code != 0 {
            return Err(Self::upstream_error(status, error));
        }
        if response.candidates.is_empty() {
            // Blocked prompts come back as 200 with filters and no candidates
            return Err(RelayError::upstream(
                status,
                "no candidates in response",
                "upstream_error",
                None,
            ));
        }

        let usage = Usage::reconcile(None, ctx.prompt_tokens, || {
            self.counter
                .count_tokens(&response.candidates[0].content, &request.model)
        });

        let choices = response
            .candidates
            .into_iter()
            .enumerate()
            .map(|(i, candidate)| Choice::stop(i as u32, candidate.content))
            .collect();

        Ok(ChatResponse::new(request.model.clone(), choices, usage))
    }

    fn translate_error(&self, status: u16, body: &[u8]) -> RelayError {
        match serde_json::from_slice::<PalmChatResponse>(body) {
            Ok(PalmChatResponse {
                error: Some(error), ..
            }) if !error.message.is_empty() => Self::upstream_error(status, error),
            _ => fallback_error(status, body),
        }
    }

    fn translate_stream(
        &self,
        response: TransportResponse,
        request: &ChatRequest,
        ctx: &CallContext,
    ) -> ChatStream {
        EmulatedStream {
            model: request.model.clone(),
            prompt_tokens: ctx.prompt_tokens,
            counter: Arc::clone(&self.counter),
        }
        .spawn(response, Box::new(|body: &[u8]| Self::first_candidate(body)))
    }
}

// PaLM API Types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PalmChatRequest {
    prompt: PalmPrompt,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    candidate_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
}

#[derive(Debug, Serialize)]
struct PalmPrompt {
    messages: Vec<PalmMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PalmMessage {
    #[serde(default)]
    author: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct PalmChatResponse {
    #[serde(default)]
    candidates: Vec<PalmMessage>,
    #[serde(default)]
    error: Option<PalmError>,
}

#[derive(Debug, Default, Deserialize)]
struct PalmError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}
