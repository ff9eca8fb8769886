//! Domain-specific error types for forecast-mind

use thiserror::Error;

use crate::clients::AgentError;

/// Main error type for the forecasting pipeline
#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("Extraction error: {message}")]
    Extraction { message: String },

    #[error("Research provider '{provider}' unavailable: {message}")]
    ProviderUnavailable { provider: String, message: String },

    #[error("Model invocation error: {message}")]
    Invocation { message: String },

    #[error("Timeout error: {operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Platform error: {message}")]
    Platform { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ForecastError {
    pub fn extraction(message: impl Into<String>) -> Self {
        ForecastError::Extraction {
            message: message.into(),
        }
    }

    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ForecastError::ProviderUnavailable {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// True for failures caused by unparseable model text
    pub fn is_extraction(&self) -> bool {
        matches!(self, ForecastError::Extraction { .. })
    }
}

impl From<AgentError> for ForecastError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Timeout { timeout_ms } => ForecastError::Timeout {
                operation: "model invocation".to_string(),
                timeout_ms,
            },
            other => ForecastError::Invocation {
                message: other.to_string(),
            },
        }
    }
}

impl From<anyhow::Error> for ForecastError {
    fn from(err: anyhow::Error) -> Self {
        ForecastError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(err: serde_json::Error) -> Self {
        ForecastError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for ForecastError {
    fn from(err: toml::de::Error) -> Self {
        ForecastError::Config {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for ForecastError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return ForecastError::Timeout {
                operation: "http request".to_string(),
                timeout_ms: 0,
            };
        }
        ForecastError::Internal {
            message: format!("HTTP request failed: {}", err),
        }
    }
}

impl From<chrono::ParseError> for ForecastError {
    fn from(err: chrono::ParseError) -> Self {
        ForecastError::Serialization {
            message: format!("Date parsing error: {}", err),
        }
    }
}

/// Result type alias for forecast-mind operations
pub type Result<T> = std::result::Result<T, ForecastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_timeout_maps_to_timeout() {
        let err: ForecastError = AgentError::Timeout { timeout_ms: 200 }.into();
        assert!(matches!(
            err,
            ForecastError::Timeout {
                timeout_ms: 200,
                ..
            }
        ));
    }

    #[test]
    fn agent_status_maps_to_invocation() {
        let err: ForecastError = AgentError::Status {
            status: 502,
            body: "bad gateway".into(),
        }
        .into();
        assert!(matches!(err, ForecastError::Invocation { .. }));
        assert!(err.to_string().contains("502"));
    }

    #[test]
    fn extraction_helper_is_flagged() {
        assert!(ForecastError::extraction("no percentage").is_extraction());
        assert!(!ForecastError::provider("exa", "down").is_extraction());
    }
}
