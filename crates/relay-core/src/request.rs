//! Request types for the relay.
//!
//! This module defines the uniform chat completion request that every vendor
//! adapter translates from.

use crate::error::RelayError;
use serde::{Deserialize, Serialize};

/// Uniform chat completion request (OpenAI schema subset)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Target model (e.g., "ERNIE-Bot", "chatglm_pro", "chat-bison-001")
    pub model: String,

    /// Chat messages for conversation
    pub messages: Vec<ChatMessage>,

    /// Sampling temperature (0.0 - 2.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Top-p (nucleus sampling) parameter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Top-k sampling parameter (vendor-specific)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,

    /// Enable streaming response
    #[serde(default)]
    pub stream: bool,

    /// Number of completions to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,

    /// User identifier for abuse tracking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl ChatRequest {
    /// Create a new builder for `ChatRequest`
    #[must_use]
    pub fn builder() -> ChatRequestBuilder {
        ChatRequestBuilder::default()
    }

    /// Validate the entire request
    ///
    /// # Errors
    /// Returns error if any field is invalid
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.model.trim().is_empty() {
            return Err(RelayError::validation(
                "model cannot be empty",
                Some("model".to_string()),
                "missing_model",
            ));
        }

        if self.messages.is_empty() {
            return Err(RelayError::validation(
                "messages cannot be empty",
                Some("messages".to_string()),
                "empty_messages",
            ));
        }

        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(RelayError::validation(
                    format!("temperature must be between 0.0 and 2.0, got {t}"),
                    Some("temperature".to_string()),
                    "invalid_temperature",
                ));
            }
        }

        if let Some(p) = self.top_p {
            if !(0.0..=1.0).contains(&p) {
                return Err(RelayError::validation(
                    format!("top_p must be between 0.0 and 1.0, got {p}"),
                    Some("top_p".to_string()),
                    "invalid_top_p",
                ));
            }
        }

        if let Some(n) = self.n {
            if n == 0 || n > 128 {
                return Err(RelayError::validation(
                    format!("n must be between 1 and 128, got {n}"),
                    Some("n".to_string()),
                    "invalid_n",
                ));
            }
        }

        Ok(())
    }
}

/// Builder for `ChatRequest`
#[derive(Debug, Default)]
pub struct ChatRequestBuilder {
    model: Option<String>,
    messages: Vec<ChatMessage>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    top_p: Option<f32>,
    top_k: Option<u32>,
    stop: Option<Vec<String>>,
    stream: bool,
    n: Option<u32>,
    user: Option<String>,
}

impl ChatRequestBuilder {
    /// Set the model
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the messages
    #[must_use]
    pub fn messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    /// Add a message
    #[must_use]
    pub fn message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    /// Set the temperature
    #[must_use]
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set max_tokens
    #[must_use]
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set top_p
    #[must_use]
    pub fn top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Set top_k
    #[must_use]
    pub fn top_k(mut self, top_k: u32) -> Self {
        self.top_k = Some(top_k);
        self
    }

    /// Set stop sequences
    #[must_use]
    pub fn stop(mut self, stop: Vec<String>) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Enable streaming
    #[must_use]
    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Set n (number of completions)
    #[must_use]
    pub fn n(mut self, n: u32) -> Self {
        self.n = Some(n);
        self
    }

    /// Set user
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Build the request
    ///
    /// # Errors
    /// Returns error if required fields are missing or invalid
    pub fn build(self) -> Result<ChatRequest, RelayError> {
        let model = self.model.ok_or_else(|| {
            RelayError::validation(
                "model is required",
                Some("model".to_string()),
                "missing_model",
            )
        })?;

        let request = ChatRequest {
            model,
            messages: self.messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            top_p: self.top_p,
            top_k: self.top_k,
            stop: self.stop,
            stream: self.stream,
            n: self.n,
            user: self.user,
        };

        request.validate()?;

        Ok(request)
    }
}

/// Chat message with role and content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message author
    pub role: MessageRole,

    /// Content of the message
    pub content: MessageContent,

    /// Optional name of the author
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    /// Create a message with the given role
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(content.into()),
            name: None,
        }
    }

    /// Create a system message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Create a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create an assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Flattened text content of the message
    #[must_use]
    pub fn text(&self) -> String {
        self.content.text()
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System message
    System,
    /// User message
    User,
    /// Assistant message
    Assistant,
    /// Tool response message
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// Message content (text or multimodal parts)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Simple text content
    Text(String),
    /// Multimodal content parts
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Text of the content; multimodal parts contribute their text parts
    /// joined by newlines, images are skipped.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Check if content is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.is_empty(),
            Self::Parts(parts) => parts.is_empty(),
        }
    }
}

/// Content part for multimodal messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Text content part
    Text {
        /// The text content
        text: String,
    },
    /// Image content part
    ImageUrl {
        /// Image URL details
        image_url: ImageUrl,
    },
}

/// Image URL for vision models
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    /// URL of the image
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = ChatRequest::builder()
            .model("ERNIE-Bot")
            .message(ChatMessage::user("Hello"))
            .temperature(0.7)
            .top_k(40)
            .build();

        let request = request.expect("should build");
        assert_eq!(request.model, "ERNIE-Bot");
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.temperature, Some(0.7));
        assert_eq!(request.top_k, Some(40));
        assert!(!request.stream);
    }

    #[test]
    fn test_request_builder_missing_model() {
        let request = ChatRequest::builder()
            .message(ChatMessage::user("Hello"))
            .build();

        assert!(request.is_err());
    }

    #[test]
    fn test_request_builder_missing_messages() {
        let request = ChatRequest::builder().model("ERNIE-Bot").build();

        assert!(request.is_err());
    }

    #[test]
    fn test_request_validation_invalid_temperature() {
        let request = ChatRequest::builder()
            .model("ERNIE-Bot")
            .message(ChatMessage::user("Hello"))
            .temperature(3.0)
            .build();

        assert!(matches!(
            request,
            Err(RelayError::Validation { ref code, .. }) if code == "invalid_temperature"
        ));
    }

    #[test]
    fn test_request_validation_invalid_n() {
        let request = ChatRequest::builder()
            .model("chat-bison-001")
            .message(ChatMessage::user("Hello"))
            .n(0)
            .build();

        assert!(request.is_err());
    }

    #[test]
    fn test_deserialize_openai_payload() {
        let request: ChatRequest = serde_json::from_str(
            r#"{
                "model": "chatglm_pro",
                "messages": [
                    {"role": "system", "content": "Be brief."},
                    {"role": "user", "content": [{"type": "text", "text": "Hi"}]}
                ],
                "stream": true,
                "top_p": 0.9
            }"#,
        )
        .expect("deserialize");

        assert!(request.stream);
        assert_eq!(request.messages[0].role, MessageRole::System);
        assert_eq!(request.messages[1].text(), "Hi");
        assert_eq!(request.top_p, Some(0.9));
    }

    #[test]
    fn test_parts_text_skips_images() {
        let content = MessageContent::Parts(vec![
            ContentPart::Text {
                text: "first".to_string(),
            },
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: "https://example.com/a.png".to_string(),
                },
            },
            ContentPart::Text {
                text: "second".to_string(),
            },
        ]);

        assert_eq!(content.text(), "first\nsecond");
    }

    #[test]
    fn test_message_content_serialization() {
        let text_content = MessageContent::Text("Hello".to_string());
        let json = serde_json::to_string(&text_content).expect("serialize");
        assert_eq!(json, "\"Hello\"");
    }
}
