use std::path::PathBuf;

use thiserror::Error;

use crate::jobs::JobState;
use crate::llm::CompletionError;

pub type Result<T, E = VoxError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum VoxError {
    #[error("Invalid input: {0}")]
    InputInvalid(String),

    #[error("Required tool `{tool}` not found on PATH")]
    ToolMissing { tool: String },

    #[error("Conversion failed for {input}: {last_error}")]
    ConversionFailed { input: PathBuf, last_error: String },

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),

    #[error("Synthesis exhausted every backend: {0}")]
    SynthesisExhausted(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: JobState,
        to: JobState,
    },

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

impl From<CompletionError> for VoxError {
    fn from(err: CompletionError) -> Self {
        match err {
            CompletionError::Malformed(_) | CompletionError::EmptyReply => {
                VoxError::MalformedResponse(err.to_string())
            }
            other => VoxError::BackendUnavailable(other.to_string()),
        }
    }
}
