//! Generation provider error types.

use thiserror::Error;

/// Result type for capability port operations.
pub type GenAiResult<T> = Result<T, GenAiError>;

/// Errors from external generation and platform providers.
#[derive(Debug, Error)]
pub enum GenAiError {
    #[error("Provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("Response violated the expected schema: {0}")]
    Schema(String),

    #[error("Generation job timed out: {0}")]
    JobTimeout(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Credential refresh failed: {0}")]
    Credential(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GenAiError {
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn credential(msg: impl Into<String>) -> Self {
        Self::Credential(msg.into())
    }

    /// Check if error is retryable.
    ///
    /// Schema violations are retryable: a second generation attempt may
    /// produce well-formed output. Configuration errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            GenAiError::Network(_) | GenAiError::Schema(_) | GenAiError::JobTimeout(_) => true,
            GenAiError::Provider { status, .. } => *status == 429 || *status >= 500,
            GenAiError::Config(_) | GenAiError::Credential(_) | GenAiError::Json(_) => false,
        }
    }
}
