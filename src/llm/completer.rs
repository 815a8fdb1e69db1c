//! The Complete adapter: retry with exponential backoff, then degrade to a
//! displayable fallback reply instead of raising.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::client::ChatSender;
use super::error::CompletionError;
use super::types::{ChatMessage, ChatRequest};
use crate::config::LlmConfig;
use crate::error::VoxError;

/// Backoff schedule shared by every completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, the first one included.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
        }
    }
}

impl RetryConfig {
    /// Delay after the given failed attempt (1-based).
    /// delay = base_delay_ms * 2^(attempt - 1)
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        self.base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Which kind of failure produced a fallback reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Timeout,
    ConnectionRefused,
    MalformedResponse,
    Generic,
}

/// Outcome of one Complete call. `reply` is always displayable; `failure`
/// is set when it is a fallback rather than a model answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub reply: String,
    pub failure: Option<FailureCategory>,
}

impl Completion {
    pub fn is_degraded(&self) -> bool {
        self.failure.is_some()
    }
}

const GENERIC_FALLBACK: &str = "(AI processing failed, please try again later)";

/// User-facing fallback text for the last error seen.
pub fn fallback_reply(err: &CompletionError) -> (FailureCategory, String) {
    match err {
        CompletionError::Timeout => (
            FailureCategory::Timeout,
            "(The language model timed out, please try again later)".into(),
        ),
        CompletionError::Connection(_) => (
            FailureCategory::ConnectionRefused,
            "(Could not connect to the language model, check that the completion service is running)"
                .into(),
        ),
        CompletionError::Malformed(detail) => (
            FailureCategory::MalformedResponse,
            format!("(Could not parse the language model response: {detail})"),
        ),
        CompletionError::EmptyReply => (
            FailureCategory::MalformedResponse,
            "(The AI returned no usable reply)".into(),
        ),
        CompletionError::Status { status, .. } => (
            FailureCategory::Generic,
            format!("(The language model request failed with HTTP status {status})"),
        ),
        CompletionError::Network(e) => (
            FailureCategory::Generic,
            format!("(An error occurred while calling the language model: {e})"),
        ),
    }
}

pub struct Completer<C> {
    sender: C,
    model: String,
    system_prompt: String,
    temperature: f32,
    max_tokens: u32,
    retry: RetryConfig,
}

impl<C: ChatSender> Completer<C> {
    pub fn new(sender: C, config: &LlmConfig) -> Self {
        Self {
            sender,
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            retry: RetryConfig {
                max_retries: config.max_retries,
                base_delay_ms: config.base_delay_ms,
            },
        }
    }

    fn build_request(&self, prompt: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(&self.system_prompt),
                ChatMessage::user(prompt),
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    /// Send `prompt`, retrying every failure with backoff. Never fails.
    pub async fn complete(&self, prompt: &str) -> Completion {
        let req = self.build_request(prompt);
        let max = self.retry.max_retries;
        let mut last_error = None;

        for attempt in 1..=max {
            debug!(attempt, max, "sending completion request");
            let result = match self.sender.send_chat(&req).await {
                Ok(resp) => resp.reply_text().ok_or(CompletionError::EmptyReply),
                Err(e) => Err(e),
            };

            match result {
                Ok(reply) => {
                    info!(attempt, reply_len = reply.len(), "completion succeeded");
                    return Completion {
                        reply,
                        failure: None,
                    };
                }
                Err(e) => {
                    warn!(attempt, max, error = %e, "completion attempt failed");
                    if attempt < max {
                        let delay_ms = self.retry.delay_for_attempt(attempt);
                        sleep(Duration::from_millis(delay_ms)).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => {
                let (category, reply) = fallback_reply(&e);
                let err: VoxError = e.into();
                warn!(attempts = max, error = %err, ?category, "completion exhausted retries");
                Completion {
                    reply,
                    failure: Some(category),
                }
            }
            None => Completion {
                reply: GENERIC_FALLBACK.into(),
                failure: Some(FailureCategory::Generic),
            },
        }
    }
}
