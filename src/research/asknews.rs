//! AskNews news search (OAuth client credentials)

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;

use super::SearchProvider;
use crate::clients::http_client;
use crate::config::ResearchConfig;
use crate::error::{ForecastError, Result};

/// Refresh tokens this long before they actually expire
const TOKEN_SLACK_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expiry")]
    expires_in: u64,
}

fn default_expiry() -> u64 {
    3600
}

pub struct AskNewsSearcher {
    base_url: String,
    token_url: String,
    client_id: String,
    secret: String,
    n_articles: usize,
    client: Client,
    token: Mutex<Option<(String, Instant)>>,
}

impl AskNewsSearcher {
    pub fn new(cfg: &ResearchConfig, client_id: String, secret: String) -> Self {
        let client = http_client(cfg.timeout_ms);
        Self {
            base_url: cfg.asknews_base_url.trim_end_matches('/').to_string(),
            token_url: cfg.asknews_token_url.clone(),
            client_id,
            secret,
            n_articles: cfg.asknews_articles,
            client,
            token: Mutex::new(None),
        }
    }

    async fn access_token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        if let Some((token, expires_at)) = guard.as_ref()
            && Instant::now() < *expires_at
        {
            return Ok(token.clone());
        }

        let resp = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.secret))
            .form(&[("grant_type", "client_credentials"), ("scope", "news")])
            .send()
            .await
            .map_err(|e| ForecastError::provider("asknews", e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ForecastError::provider(
                "asknews",
                format!("token request returned {}", resp.status()),
            ));
        }
        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| ForecastError::provider("asknews", e.to_string()))?;

        let lifetime = token.expires_in.saturating_sub(TOKEN_SLACK_SECS);
        *guard = Some((
            token.access_token.clone(),
            Instant::now() + Duration::from_secs(lifetime),
        ));
        Ok(token.access_token)
    }

    async fn search(&self, token: &str, query: &str, strategy: &str, historical: bool) -> Result<String> {
        let n_articles = self.n_articles.to_string();
        let historical = historical.to_string();
        let resp = self
            .client
            .get(format!("{}/news/search", self.base_url))
            .bearer_auth(token)
            .query(&[
                ("query", query),
                ("n_articles", n_articles.as_str()),
                ("return_type", "string"),
                ("method", "kw"),
                ("strategy", strategy),
                ("historical", historical.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ForecastError::provider("asknews", e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ForecastError::provider(
                "asknews",
                format!("news search returned {}: {}", status, text),
            ));
        }
        let val: Value = resp
            .json()
            .await
            .map_err(|e| ForecastError::provider("asknews", e.to_string()))?;
        Ok(articles_text(&val))
    }
}

fn articles_text(val: &Value) -> String {
    val.get("as_string")
        .and_then(|s| s.as_str())
        .unwrap_or("")
        .trim()
        .to_string()
}

/// Combine recent and historical searches into one brief
pub fn format_news(latest: &str, historical: &str) -> String {
    let mut out = String::new();
    if !latest.is_empty() {
        out.push_str("Here are the relevant news articles:\n\n");
        out.push_str(latest);
    }
    if !historical.is_empty() {
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str("Historical context:\n\n");
        out.push_str(historical);
    }
    out
}

#[async_trait]
impl SearchProvider for AskNewsSearcher {
    fn name(&self) -> &str {
        "asknews"
    }

    async fn query(&self, question_text: &str) -> Result<String> {
        let token = self.access_token().await?;
        let latest = self
            .search(&token, question_text, "latest news", false)
            .await?;
        let historical = self
            .search(&token, question_text, "news knowledge", true)
            .await?;
        Ok(format_news(&latest, &historical))
    }
}
