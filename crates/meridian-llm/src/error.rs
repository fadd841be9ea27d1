use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Circuit open for operation: {operation}")]
    CircuitOpen { operation: String },

    #[error("LLM request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("LLM request timed out after {seconds}s")]
    Timeout { seconds: f64 },

    #[error("Unexpected LLM response: {0}")]
    BadResponse(String),

    #[error("LLM not configured (no API key)")]
    NotConfigured,
}

pub type Result<T> = std::result::Result<T, LlmError>;
