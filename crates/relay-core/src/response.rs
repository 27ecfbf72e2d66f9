//! Response types for the relay (OpenAI `chat.completion` schema).

use crate::request::MessageRole;
use serde::{Deserialize, Serialize};

/// Uniform chat completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Response identifier (`chatcmpl-...`)
    pub id: String,
    /// Always `chat.completion`
    pub object: String,
    /// Unix timestamp (seconds)
    pub created: i64,
    /// Model that produced the response
    pub model: String,
    /// Completion choices, in vendor candidate order
    pub choices: Vec<Choice>,
    /// Token accounting
    pub usage: Usage,
}

impl ChatResponse {
    /// Create a response with a fresh id and creation time
    #[must_use]
    pub fn new(model: impl Into<String>, choices: Vec<Choice>, usage: Usage) -> Self {
        Self {
            id: crate::completion_id(),
            object: "chat.completion".to_string(),
            created: chrono::Utc::now().timestamp(),
            model: model.into(),
            choices,
            usage,
        }
    }

    /// Content of the first choice, if any
    #[must_use]
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

/// A single completion choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    /// Position in the choice list
    pub index: u32,
    /// Generated message
    pub message: ResponseMessage,
    /// Why generation stopped
    pub finish_reason: Option<FinishReason>,
}

impl Choice {
    /// Assistant choice that finished normally
    #[must_use]
    pub fn stop(index: u32, content: impl Into<String>) -> Self {
        Self {
            index,
            message: ResponseMessage {
                role: MessageRole::Assistant,
                content: content.into(),
            },
            finish_reason: Some(FinishReason::Stop),
        }
    }
}

/// Message inside a choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage {
    /// Author role, always assistant for vendor output
    pub role: MessageRole,
    /// Generated text
    pub content: String,
}

/// Finish reason
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of generation
    Stop,
    /// Truncated by the token limit
    Length,
    /// Blocked by a content filter
    ContentFilter,
}

/// Token usage counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt
    pub prompt_tokens: u32,
    /// Tokens in the completion
    pub completion_tokens: u32,
    /// Total tokens
    pub total_tokens: u32,
}

impl Usage {
    /// Usage whose total is prompt + completion
    #[must_use]
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }

    /// Merge vendor-reported counters with locally known ones.
    ///
    /// Vendor values win wherever present. The prompt count falls back to
    /// the caller-supplied `prompt_tokens`, the completion count to
    /// `estimate_completion` (only evaluated when needed), and the total to
    /// prompt + completion.
    #[must_use]
    pub fn reconcile(
        reported: Option<&ReportedUsage>,
        prompt_tokens: u32,
        estimate_completion: impl FnOnce() -> u32,
    ) -> Self {
        let reported = reported.copied().unwrap_or_default();
        let prompt = reported.prompt_tokens.unwrap_or(prompt_tokens);
        let completion = reported
            .completion_tokens
            .unwrap_or_else(estimate_completion);
        let total = reported
            .total_tokens
            .unwrap_or_else(|| prompt.saturating_add(completion));

        Self {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: total,
        }
    }
}

/// Usage block as reported by a vendor; any field may be missing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedUsage {
    /// Vendor prompt token count
    #[serde(default)]
    pub prompt_tokens: Option<u32>,
    /// Vendor completion token count
    #[serde(default)]
    pub completion_tokens: Option<u32>,
    /// Vendor total token count
    #[serde(default)]
    pub total_tokens: Option<u32>,
}
