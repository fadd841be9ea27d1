use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeridianError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("LLM provider error: {0}")]
    LlmProvider(String),

    #[error("Circuit open for operation: {operation}")]
    CircuitOpen { operation: String },

    #[error("Session not found: {id}")]
    SessionNotFound { id: String },

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Connector error ({platform}): {reason}")]
    Connector { platform: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Request timeout after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MeridianError {
    /// Short error code for structured logs and JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            MeridianError::Config(_) => "CONFIG_ERROR",
            MeridianError::AuthFailed(_) => "AUTH_FAILED",
            MeridianError::InvalidInput(_) => "INVALID_INPUT",
            MeridianError::Storage(_) => "STORAGE_ERROR",
            MeridianError::LlmProvider(_) => "LLM_PROVIDER_ERROR",
            MeridianError::CircuitOpen { .. } => "CIRCUIT_OPEN",
            MeridianError::SessionNotFound { .. } => "SESSION_NOT_FOUND",
            MeridianError::InvalidTimezone(_) => "INVALID_TIMEZONE",
            MeridianError::Connector { .. } => "CONNECTOR_ERROR",
            MeridianError::Serialization(_) => "SERIALIZATION_ERROR",
            MeridianError::Io(_) => "IO_ERROR",
            MeridianError::Timeout { .. } => "TIMEOUT",
            MeridianError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, MeridianError>;
