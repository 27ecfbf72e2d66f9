//! Baidu Wenxin workshop (ERNIE) provider implementation.
//!
//! # API Format
//! - Chat: `{BASE}/rpc/2.0/ai_custom/v1/wenxinworkshop/chat/{ENDPOINT}?access_token={TOKEN}`
//! - Tokens come from the OAuth client-credentials endpoint and are cached in
//!   a [`CredentialStore`] with background renewal.
//! - Streaming responses are SSE `data:` events carrying `is_end`.

use crate::adapter::{fallback_error, fold_system_messages, CallContext, VendorAdapter};
use crate::stream::{EventTranslator, SseTranslation, StreamEvent};
use async_trait::async_trait;
use relay_auth::{CredentialStore, OAuthIssuer, StoreConfig, SystemClock};
use relay_core::{
    ChatRequest, ChatResponse, ChatStream, Choice, EstimatingTokenCounter, FinishReason,
    HttpTransport, ProviderKind, RelayError, ReportedUsage, SseEvent, TokenCounter,
    TransportRequest, TransportResponse, Usage,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default API host
pub const DEFAULT_BAIDU_BASE_URL: &str = "https://aip.baidubce.com";

const CHAT_PATH: &str = "/rpc/2.0/ai_custom/v1/wenxinworkshop/chat";

/// Map a public model name to its wenxinworkshop endpoint
///
/// # Errors
/// `UnsupportedModel` for names without an endpoint
pub fn endpoint_for_model(model: &str) -> Result<&'static str, RelayError> {
    match model {
        "ERNIE-Bot" => Ok("completions"),
        "ERNIE-Bot-turbo" => Ok("eb-instant"),
        "ERNIE-Bot-4" => Ok("completions_pro"),
        "BLOOMZ-7B" => Ok("bloomz_7b1"),
        other => Err(RelayError::unsupported_model(other)),
    }
}

/// Baidu provider configuration
#[derive(Debug, Clone)]
pub struct BaiduConfig {
    /// Provider instance ID
    pub id: String,
    /// API host, also used for the OAuth token endpoint
    pub base_url: String,
    /// Token refresh lookahead
    pub lookahead: Duration,
}

impl BaiduConfig {
    /// Configuration with default host and lookahead
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base_url: DEFAULT_BAIDU_BASE_URL.to_string(),
            lookahead: relay_auth::DEFAULT_LOOKAHEAD,
        }
    }

    /// Override the API host
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the refresh lookahead
    #[must_use]
    pub fn with_lookahead(mut self, lookahead: Duration) -> Self {
        self.lookahead = lookahead;
        self
    }
}

/// Baidu ERNIE provider
pub struct BaiduProvider {
    config: BaiduConfig,
    transport: Arc<dyn HttpTransport>,
    counter: Arc<dyn TokenCounter>,
    store: CredentialStore,
}

impl BaiduProvider {
    /// Create a provider with its own OAuth-backed credential store.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: BaiduConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let issuer = OAuthIssuer::new(Arc::clone(&transport)).with_base_url(config.base_url.clone());
        let store = CredentialStore::with_config(
            Arc::new(issuer),
            StoreConfig {
                lookahead: config.lookahead,
            },
            Arc::new(SystemClock),
        );
        Self {
            config,
            transport,
            counter: Arc::new(EstimatingTokenCounter::default()),
            store,
        }
    }

    /// Replace the credential store
    #[must_use]
    pub fn with_store(mut self, store: CredentialStore) -> Self {
        self.store = store;
        self
    }

    /// Replace the token counter
    #[must_use]
    pub fn with_token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    /// Credential store backing this provider
    #[must_use]
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    fn transform_request(request: &ChatRequest, stream: bool) -> BaiduChatRequest {
        BaiduChatRequest {
            messages: fold_system_messages(&request.messages)
                .into_iter()
                .map(|(role, content)| BaiduMessage { role, content })
                .collect(),
            temperature: request.temperature,
            top_p: request.top_p,
            stream,
            user_id: request.user.clone(),
        }
    }

    fn chat_url(&self, endpoint: &str, access_token: &str) -> Result<String, RelayError> {
        let base = self.config.base_url.trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}{CHAT_PATH}/{endpoint}"))
            .map_err(|e| RelayError::configuration(format!("Invalid Baidu base URL: {e}")))?;
        url.query_pairs_mut().append_pair("access_token", access_token);
        Ok(url.into())
    }

    fn stream_translator() -> EventTranslator {
        Box::new(|event: &SseEvent| {
            if event.data.trim().is_empty() {
                return StreamEvent::Skip;
            }
            match serde_json::from_str::<BaiduChatResponse>(&event.data) {
                Ok(chunk) if chunk.error_code != 0 => StreamEvent::Fail(RelayError::upstream(
                    200,
                    chunk.error_msg,
                    "baidu_error",
                    Some(chunk.error_code.to_string()),
                )),
                Ok(chunk) => StreamEvent::Delta {
                    content: chunk.result,
                    finished: chunk.is_end,
                    usage: chunk.usage,
                },
                Err(e) => StreamEvent::Fail(e.into()),
            }
        })
    }
}

impl std::fmt::Debug for BaiduProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaiduProvider")
            .field("config", &self.config)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl VendorAdapter for BaiduProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Baidu
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
        let endpoint = endpoint_for_model(&request.model)?;
        let token = self.store.get_token(&ctx.credential).await?;
        let url = self.chat_url(endpoint, token.secret())?;

        debug!(provider = "baidu", model = %request.model, endpoint, stream, "Built chat request");

        TransportRequest::post(url)
            .header(
                "Accept",
                if stream {
                    "text/event-stream"
                } else {
                    "application/json"
                },
            )
            .json(&Self::transform_request(request, stream))
    }

    fn translate_response(
        &self,
        status: u16,
        body: &[u8],
        request: &ChatRequest,
        ctx: &CallContext,
    ) -> Result<ChatResponse, RelayError> {
        let response: BaiduChatResponse = serde_json::from_slice(body)?;

        if response.error_code != 0 {
            return Err(RelayError::upstream(
                status,
                response.error_msg,
                "baidu_error",
                Some(response.error_code.to_string()),
            ));
        }

        let usage = Usage::reconcile(response.usage.as_ref(), ctx.prompt_tokens, || {
            self.counter.count_tokens(&response.result, &request.model)
        });

        let mut choice = Choice::stop(0, response.result);
        if response.is_truncated {
            choice.finish_reason = Some(FinishReason::Length);
        }

        Ok(ChatResponse::new(request.model.clone(), vec![choice], usage))
    }

    fn translate_error(&self, status: u16, body: &[u8]) -> RelayError {
        match serde_json::from_slice::<BaiduChatResponse>(body) {
            Ok(envelope) if envelope.error_code != 0 => RelayError::upstream(
                status,
                envelope.error_msg,
                "baidu_error",
                Some(envelope.error_code.to_string()),
            ),
            _ => fallback_error(status, body),
        }
    }

    fn translate_stream(
        &self,
        response: TransportResponse,
        request: &ChatRequest,
        ctx: &CallContext,
    ) -> ChatStream {
        SseTranslation {
            provider: "baidu",
            model: request.model.clone(),
            prompt_tokens: ctx.prompt_tokens,
            counter: Arc::clone(&self.counter),
        }
        .run(response, Self::stream_translator())
    }
}

// Baidu API Types

#[derive(Debug, Serialize)]
struct BaiduChatRequest {
    messages: Vec<BaiduMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct BaiduMessage {
    role: &'static str,
    content: String,
}

/// Response body, also used for each streamed event and for error envelopes
#[derive(Debug, Default, Deserialize)]
struct BaiduChatResponse {
    #[serde(default)]
    result: String,
    #[serde(default)]
    is_truncated: bool,
    #[serde(default)]
    is_end: bool,
    #[serde(default)]
    usage: Option<ReportedUsage>,
    #[serde(default)]
    error_code: i64,
    #[serde(default)]
    error_msg: String,
}
