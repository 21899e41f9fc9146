use thiserror::Error;

/// failures of the inbound collaborator. the only errors that end a turn
/// as `Failed`; parsing itself never fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request failed with status {code}: {reason}")]
    Status { code: u16, reason: String },
    #[error("transport i/o error: {0}")]
    Io(String),
    #[error("provider error: {0}")]
    Provider(String),
}

impl From<llm::error::LLMError> for TransportError {
    fn from(err: llm::error::LLMError) -> Self {
        Self::Provider(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read parse config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid parse config: {0}")]
    Json(#[from] serde_json::Error),
}
