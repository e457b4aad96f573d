//! Error types for psycsim-llm

use thiserror::Error;

/// Errors that can occur while invoking a generation capability
#[derive(Error, Debug)]
pub enum LlmError {
    /// Transport failure (connect, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(String),

    /// The API answered with a non-success status
    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },

    /// The reply did not contain the structured JSON that was requested
    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    /// A required credential is not configured
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    /// Invalid client configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::MalformedOutput(err.to_string())
    }
}
