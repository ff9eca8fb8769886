//! OpenAI-compatible chat completions client.
//!
//! Works against the Metaculus proxy, OpenRouter and Perplexity, which all
//! speak the `/chat/completions` dialect.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use crate::clients::http::http_client;
use crate::clients::traits::{AgentError, LanguageModel};
use crate::config::LlmConfig;

const RETRY_BACKOFF_MS: u64 = 1_000;
const DEFAULT_TIMEOUT_MS: u64 = 120_000;

#[derive(Clone, Debug)]
pub struct ChatCompletionsClient {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    timeout_ms: u64,
    allowed_tries: u32,
    client: Client,
}

impl ChatCompletionsClient {
    pub fn new(base_url: &str, model: impl Into<String>, api_key: Option<String>) -> Self {
        // Accept either a bare base URL or the full completions path
        let endpoint = if base_url.ends_with("/chat/completions") {
            base_url.to_string()
        } else {
            format!("{}/chat/completions", base_url.trim_end_matches('/'))
        };

        Self {
            endpoint,
            model: model.into(),
            api_key,
            temperature: 0.3,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            allowed_tries: 1,
            client: http_client(DEFAULT_TIMEOUT_MS),
        }
    }

    pub fn from_config(cfg: &LlmConfig, api_key: Option<String>) -> Self {
        Self::new(&cfg.base_url, cfg.model.clone(), api_key)
            .with_temperature(cfg.temperature)
            .with_timeout_ms(cfg.timeout_ms)
            .with_allowed_tries(cfg.allowed_tries)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self.client = http_client(timeout_ms);
        self
    }

    pub fn with_allowed_tries(mut self, allowed_tries: u32) -> Self {
        self.allowed_tries = allowed_tries.max(1);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call_once(&self, prompt: &str) -> Result<String, AgentError> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "temperature": self.temperature,
        });

        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let res = req.send().await.map_err(|e| {
            if e.is_timeout() {
                AgentError::Timeout {
                    timeout_ms: self.timeout_ms,
                }
            } else {
                AgentError::Http(e.to_string())
            }
        })?;

        let status = res.status();
        if !status.is_success() {
            let text = res
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            return Err(AgentError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let val: Value = res
            .json()
            .await
            .map_err(|e| AgentError::ParseError(e.to_string()))?;
        parse_completion(&val)
    }
}

/// Pull the assistant text out of a chat completions payload
pub fn parse_completion(val: &Value) -> Result<String, AgentError> {
    let content = val
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| AgentError::ParseError(format!("unexpected completion shape: {}", val)))?;

    let content = content.trim();
    if content.is_empty() {
        return Err(AgentError::EmptyResponse);
    }
    Ok(content.to_string())
}

#[async_trait]
impl LanguageModel for ChatCompletionsClient {
    async fn invoke(&self, prompt: &str) -> Result<String, AgentError> {
        let mut attempt = 1;
        loop {
            match self.call_once(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.allowed_tries => {
                    tracing::warn!(
                        "model {} attempt {}/{} failed: {}",
                        self.model,
                        attempt,
                        self.allowed_tries,
                        e
                    );
                    tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS * attempt as u64))
                        .await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
