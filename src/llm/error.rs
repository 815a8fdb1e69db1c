//! Error types for the completion client.

use thiserror::Error;

/// Everything that can go wrong talking to the completion service.
///
/// Every variant is retryable from the adapter's point of view; the variant
/// only decides which fallback wording the caller eventually sees.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// The request exceeded the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The service could not be reached (refused, DNS, reset).
    #[error("connection failed: {0}")]
    Connection(String),

    /// Non-success HTTP status.
    #[error("service returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The body was not the expected JSON shape.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Well-formed response whose reply text was missing or blank.
    #[error("empty reply")]
    EmptyReply,

    /// Any other transport failure.
    #[error("network error: {0}")]
    Network(reqwest::Error),
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CompletionError::Timeout
        } else if err.is_connect() {
            CompletionError::Connection(err.to_string())
        } else if err.is_decode() {
            CompletionError::Malformed(err.to_string())
        } else {
            CompletionError::Network(err)
        }
    }
}
