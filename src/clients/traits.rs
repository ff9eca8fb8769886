use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("model timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("http error: {0}")]
    Http(String),
    #[error("model endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("parse error: {0}")]
    ParseError(String),
    #[error("model returned an empty response")]
    EmptyResponse,
}

impl AgentError {
    /// Transport failures and 5xx/429 responses are worth another try
    pub fn is_retryable(&self) -> bool {
        match self {
            AgentError::Timeout { .. } | AgentError::Http(_) | AgentError::EmptyResponse => true,
            AgentError::Status { status, .. } => *status == 429 || *status >= 500,
            AgentError::ParseError(_) => false,
        }
    }
}

/// Anything that turns a prompt into free text.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn invoke(&self, prompt: &str) -> Result<String, AgentError>;

    /// Model identifier, used in logs and reports.
    fn model_name(&self) -> &str;
}
