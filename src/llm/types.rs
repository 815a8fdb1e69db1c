//! Request and response bodies for an OpenAI-style `chat/completions` endpoint.
//!
//! Only the fields the completion adapter reads are modelled; unknown fields
//! in the response are ignored by serde.

use serde::{Deserialize, Serialize};

/// Body posted to the completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model identifier understood by the completion service.
    pub model: String,
    /// Conversation so far, oldest first.
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
}

/// A single role/content pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// "system", "user" or "assistant".
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Response body. The reply lives at `choices[0].message.content`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub message: ChatReplyMessage,
}

/// `content` is optional because some servers send `null` for tool calls or
/// refusals; the adapter treats that the same as a blank reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReplyMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatResponse {
    /// Trimmed reply text, or `None` when there is no choice or the content is blank.
    pub fn reply_text(&self) -> Option<String> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}
