pub mod client;
pub mod completer;
pub mod error;
pub mod types;

pub use client::{ChatClient, ChatSender};
pub use completer::{Completer, Completion, FailureCategory, RetryConfig};
pub use error::CompletionError;
pub use types::{ChatMessage, ChatRequest, ChatResponse};
