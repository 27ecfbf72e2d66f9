//! Zhipu open platform (ChatGLM, v3 model-api) provider implementation.
//!
//! # API Format
//! - Chat: `{BASE}/api/paas/v3/model-api/{MODEL}/invoke`
//! - Stream: `{BASE}/api/paas/v3/model-api/{MODEL}/sse-invoke`
//! - Auth: `Authorization: <self-signed HS256 token>`
//!
//! Streams use named SSE events (`add`, `finish`, `error`, `interrupted`);
//! the `finish` event carries a `meta:` line with usage.

use crate::adapter::{fallback_error, fold_system_messages, CallContext, VendorAdapter};
use crate::stream::{EventTranslator, SseTranslation, StreamEvent};
use async_trait::async_trait;
use relay_auth::{CredentialStore, SignedTokenIssuer, StoreConfig, SystemClock};
use relay_core::{
    ChatRequest, ChatResponse, ChatStream, Choice, EstimatingTokenCounter, HttpTransport,
    ProviderKind, RelayError, ReportedUsage, SseEvent, TokenCounter, TransportRequest,
    TransportResponse, Usage,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default API host
pub const DEFAULT_ZHIPU_BASE_URL: &str = "https://open.bigmodel.cn";

const CHAT_PATH: &str = "/api/paas/v3/model-api";

/// Zhipu provider configuration
#[derive(Debug, Clone)]
pub struct ZhipuConfig {
    /// Provider instance ID
    pub id: String,
    /// API host
    pub base_url: String,
    /// Validity of self-signed tokens
    pub token_ttl: Duration,
    /// Token refresh lookahead
    pub lookahead: Duration,
}

impl ZhipuConfig {
    /// Configuration with default host, token TTL and lookahead
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base_url: DEFAULT_ZHIPU_BASE_URL.to_string(),
            token_ttl: relay_auth::DEFAULT_SIGNED_TTL,
            lookahead: relay_auth::DEFAULT_LOOKAHEAD,
        }
    }

    /// Override the API host
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the signed token TTL
    #[must_use]
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Override the refresh lookahead
    #[must_use]
    pub fn with_lookahead(mut self, lookahead: Duration) -> Self {
        self.lookahead = lookahead;
        self
    }
}

/// Zhipu ChatGLM provider
pub struct ZhipuProvider {
    config: ZhipuConfig,
    transport: Arc<dyn HttpTransport>,
    counter: Arc<dyn TokenCounter>,
    store: CredentialStore,
}

impl ZhipuProvider {
    /// Create a provider with its own signed-token credential store.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: ZhipuConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let issuer = SignedTokenIssuer::new().with_ttl(config.token_ttl);
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

    fn transform_request(request: &ChatRequest, stream: bool) -> ZhipuChatRequest {
        ZhipuChatRequest {
            prompt: fold_system_messages(&request.messages)
                .into_iter()
                .map(|(role, content)| ZhipuMessage { role, content })
                .collect(),
            temperature: request.temperature,
            top_p: request.top_p,
            incremental: stream.then_some(true),
        }
    }

    fn chat_url(&self, model: &str, stream: bool) -> Result<String, RelayError> {
        let base = self.config.base_url.trim_end_matches('/');
        let action = if stream { "sse-invoke" } else { "invoke" };
        let mut url = Url::parse(&format!("{base}{CHAT_PATH}"))
            .map_err(|e| RelayError::configuration(format!("Invalid Zhipu base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| RelayError::configuration("Zhipu base URL cannot carry a path"))?
            .push(model)
            .push(action);
        Ok(url.into())
    }

    fn stream_translator() -> EventTranslator {
        Box::new(|event: &SseEvent| match event.event.as_deref() {
            Some("add") => StreamEvent::Delta {
                content: event.data.clone(),
                finished: false,
                usage: None,
            },
            Some("finish") => StreamEvent::Delta {
                content: event.data.clone(),
                finished: true,
                usage: event
                    .field("meta")
                    .and_then(|meta| serde_json::from_str::<ZhipuStreamMeta>(meta).ok())
                    .and_then(|meta| meta.usage),
            },
            Some(kind @ ("error" | "interrupted")) => StreamEvent::Fail(RelayError::upstream(
                200,
                event.data.clone(),
                "zhipu_error",
                Some(kind.to_string()),
            )),
            _ => StreamEvent::Skip,
        })
    }
}

/// Zhipu returns choice content as a JSON string literal, quotes included
fn unquote_content(content: &str) -> String {
    let unquoted = serde_json::from_str::<String>(content)
        .unwrap_or_else(|_| content.trim_matches('"').to_string());
    unquoted.trim().to_string()
}

impl std::fmt::Debug for ZhipuProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZhipuProvider")
            .field("config", &self.config)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl VendorAdapter for ZhipuProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Zhipu
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
        let token = self.store.get_token(&ctx.credential).await?;
        let url = self.chat_url(&request.model, stream)?;

        debug!(provider = "zhipu", model = %request.model, stream, "Built chat request");

        TransportRequest::post(url)
            .header("Authorization", token.secret())
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
        let response: ZhipuChatResponse = serde_json::from_slice(body)?;

        if !response.success || response.code != 200 {
            return Err(RelayError::upstream(
                status,
                response.msg,
                "zhipu_error",
                Some(response.code.to_string()),
            ));
        }

        let data = response.data.unwrap_or_default();
        if data.choices.is_empty() {
            return Err(RelayError::upstream(
                status,
                "no choices in response",
                "zhipu_error",
                None,
            ));
        }

        let contents: Vec<String> = data
            .choices
            .iter()
            .map(|c| unquote_content(&c.content))
            .collect();

        let usage = Usage::reconcile(data.usage.as_ref(), ctx.prompt_tokens, || {
            self.counter.count_tokens(&contents[0], &request.model)
        });

        let choices = contents
            .into_iter()
            .enumerate()
            .map(|(i, content)| Choice::stop(i as u32, content))
            .collect();

        Ok(ChatResponse::new(request.model.clone(), choices, usage))
    }

    fn translate_error(&self, status: u16, body: &[u8]) -> RelayError {
        match serde_json::from_slice::<ZhipuChatResponse>(body) {
            Ok(envelope) if !envelope.msg.is_empty() => RelayError::upstream(
                status,
                envelope.msg,
                "zhipu_error",
                Some(envelope.code.to_string()),
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
            provider: "zhipu",
            model: request.model.clone(),
            prompt_tokens: ctx.prompt_tokens,
            counter: Arc::clone(&self.counter),
        }
        .run(response, Self::stream_translator())
    }
}

// Zhipu API Types

#[derive(Debug, Serialize)]
struct ZhipuChatRequest {
    prompt: Vec<ZhipuMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    incremental: Option<bool>,
}

#[derive(Debug, Serialize)]
struct ZhipuMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Default, Deserialize)]
struct ZhipuChatResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<ZhipuResponseData>,
}

#[derive(Debug, Default, Deserialize)]
struct ZhipuResponseData {
    #[serde(default)]
    choices: Vec<ZhipuChoice>,
    #[serde(default)]
    usage: Option<ReportedUsage>,
}

#[derive(Debug, Deserialize)]
struct ZhipuChoice {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ZhipuStreamMeta {
    #[serde(default)]
    usage: Option<ReportedUsage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::ChatMessage;

    #[test]
    fn test_unquote_content() {
        assert_eq!(unquote_content("\" Hello\\nworld\""), "Hello\nworld");
        assert_eq!(unquote_content("plain"), "plain");
        assert_eq!(unquote_content("\"broken"), "broken");
    }

    #[test]
    fn test_transform_request() {
        let request = ChatRequest::builder()
            .model("chatglm_pro")
            .message(ChatMessage::system("Rules"))
            .message(ChatMessage::user("Hi"))
            .top_p(0.7)
            .build()
            .expect("request");

        let plain = serde_json::to_value(ZhipuProvider::transform_request(&request, false))
            .expect("serialize");
        assert_eq!(plain["prompt"].as_array().map(Vec::len), Some(3));
        assert_eq!(plain["prompt"][1]["content"], "Okay");
        assert!(plain.get("incremental").is_none());

        let streaming = serde_json::to_value(ZhipuProvider::transform_request(&request, true))
            .expect("serialize");
        assert_eq!(streaming["incremental"], true);
    }

    #[test]
    fn test_stream_translator_events() {
        let mut translate = ZhipuProvider::stream_translator();

        let add = SseEvent {
            event: Some("add".to_string()),
            data: "你".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            translate(&add),
            StreamEvent::Delta { ref content, finished: false, .. } if content == "你"
        ));

        let finish = SseEvent {
            event: Some("finish".to_string()),
            data: String::new(),
            id: None,
            fields: vec![(
                "meta".to_string(),
                r#"{"task_status":"SUCCESS","usage":{"prompt_tokens":4,"completion_tokens":9,"total_tokens":13}}"#
                    .to_string(),
            )],
        };
        match translate(&finish) {
            StreamEvent::Delta {
                finished, usage, ..
            } => {
                assert!(finished);
                assert_eq!(usage.and_then(|u| u.total_tokens), Some(13));
            }
            other => panic!("unexpected {other:?}"),
        }

        let interrupted = SseEvent {
            event: Some("interrupted".to_string()),
            data: "cut".to_string(),
            ..Default::default()
        };
        assert!(matches!(translate(&interrupted), StreamEvent::Fail(_)));

        let unknown = SseEvent {
            event: Some("ping".to_string()),
            ..Default::default()
        };
        assert!(matches!(translate(&unknown), StreamEvent::Skip));
    }

    #[tokio::test]
    async fn test_chat_url_escapes_model() {
        let transport = relay_core::ReqwestTransport::new(&relay_core::TransportConfig::default())
            .expect("transport");
        let provider = ZhipuProvider::new(
            ZhipuConfig::new("glm").with_base_url("http://localhost:9000/"),
            Arc::new(transport),
        );

        assert_eq!(
            provider.chat_url("chatglm_pro", true).expect("url"),
            "http://localhost:9000/api/paas/v3/model-api/chatglm_pro/sse-invoke"
        );

        let url = provider.chat_url("x/../y?z#w", false).expect("url");
        assert!(url.starts_with("http://localhost:9000/api/paas/v3/model-api/"));
        assert!(url.ends_with("/invoke"));
        assert!(!url.contains('?'));
        assert!(!url.contains('#'));
        assert_eq!(Url::parse(&url).expect("parse").path_segments().map(Iterator::count), Some(6));
    }
}
