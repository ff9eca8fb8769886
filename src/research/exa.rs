//! Exa web search, summarised into a research rundown by a language model

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use super::{SearchProvider, research_assistant_prompt};
use crate::clients::{LanguageModel, http_client};
use crate::config::ResearchConfig;
use crate::error::{ForecastError, Result};

const HIGHLIGHT_SENTENCES: u32 = 3;
const MAX_TEXT_CHARS: usize = 1_500;

pub struct ExaSearcher {
    base_url: String,
    api_key: String,
    num_results: usize,
    client: Client,
    model: Arc<dyn LanguageModel>,
}

impl ExaSearcher {
    pub fn new(cfg: &ResearchConfig, api_key: String, model: Arc<dyn LanguageModel>) -> Self {
        Self {
            base_url: cfg.exa_base_url.trim_end_matches('/').to_string(),
            api_key,
            num_results: cfg.exa_results,
            client: http_client(cfg.timeout_ms),
            model,
        }
    }

    async fn search(&self, question_text: &str) -> Result<Value> {
        let body = json!({
            "query": question_text,
            "numResults": self.num_results,
            "type": "auto",
            "contents": {
                "highlights": {"numSentences": HIGHLIGHT_SENTENCES},
                "text": {"maxCharacters": MAX_TEXT_CHARS}
            }
        });
        let resp = self
            .client
            .post(format!("{}/search", self.base_url))
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ForecastError::provider("exa", e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ForecastError::provider(
                "exa",
                format!("search returned {}: {}", status, text),
            ));
        }
        resp.json()
            .await
            .map_err(|e| ForecastError::provider("exa", e.to_string()))
    }

    /// Have the model write the rundown from the search hits.
    /// No hits means no research; the model is not called.
    async fn synthesize(&self, question_text: &str, hits: &str) -> Result<String> {
        if hits.trim().is_empty() {
            return Ok(String::new());
        }
        let prompt = synthesis_prompt(question_text, hits);
        self.model
            .invoke(&prompt)
            .await
            .map_err(|e| ForecastError::provider("exa", e.to_string()))
    }
}

/// Research-assistant prompt followed by the search results to work from
pub fn synthesis_prompt(question_text: &str, hits: &str) -> String {
    format!(
        "{}\n\nBase the rundown only on these search results, citing them by number:\n\n{}",
        research_assistant_prompt(question_text),
        hits
    )
}

/// Render search results as a numbered list of sources with highlights
pub fn format_results(val: &Value) -> String {
    let Some(results) = val.get("results").and_then(|r| r.as_array()) else {
        return String::new();
    };
    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let title = r.get("title").and_then(|t| t.as_str()).unwrap_or("(untitled)");
            let url = r.get("url").and_then(|u| u.as_str()).unwrap_or("");
            let date = r
                .get("publishedDate")
                .and_then(|d| d.as_str())
                .map(|d| format!(" ({})", d.get(..10).unwrap_or(d)))
                .unwrap_or_default();
            let highlights: Vec<&str> = r
                .get("highlights")
                .and_then(|h| h.as_array())
                .map(|h| h.iter().filter_map(|s| s.as_str()).collect())
                .unwrap_or_default();
            let body = if highlights.is_empty() {
                r.get("text")
                    .and_then(|t| t.as_str())
                    .map(|t| t.chars().take(MAX_TEXT_CHARS).collect::<String>())
                    .unwrap_or_default()
            } else {
                highlights.join(" ... ")
            };
            format!("[{}] {}{}\n{}\n{}", i + 1, title, date, url, body.trim())
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl SearchProvider for ExaSearcher {
    fn name(&self) -> &str {
        "exa"
    }

    async fn query(&self, question_text: &str) -> Result<String> {
        let val = self.search(question_text).await?;
        let hits = format_results(&val);
        tracing::debug!("exa returned {} chars of search results", hits.len());
        self.synthesize(question_text, &hits).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::AgentError;
    use std::sync::Mutex;

    struct Recorder {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LanguageModel for Recorder {
        async fn invoke(&self, prompt: &str) -> std::result::Result<String, AgentError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("Rundown: a storm warning is in place.".to_string())
        }

        fn model_name(&self) -> &str {
            "recorder"
        }
    }

    struct Broken;

    #[async_trait]
    impl LanguageModel for Broken {
        async fn invoke(&self, _prompt: &str) -> std::result::Result<String, AgentError> {
            Err(AgentError::Timeout { timeout_ms: 5 })
        }

        fn model_name(&self) -> &str {
            "broken"
        }
    }

    fn searcher(model: Arc<dyn LanguageModel>) -> ExaSearcher {
        ExaSearcher::new(&ResearchConfig::default(), "key".into(), model)
    }

    #[tokio::test]
    async fn hits_are_summarised_with_research_assistant_prompt() {
        let model = Arc::new(Recorder {
            prompts: Mutex::new(Vec::new()),
        });
        let exa = searcher(model.clone());
        let hits = "[1] Storm warning issued (2025-06-01)\nhttps://news.example/storm\nHeavy rain expected.";
        let out = exa.synthesize("Will it rain tomorrow?", hits).await.unwrap();
        assert_eq!(out, "Rundown: a storm warning is in place.");

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].starts_with(&research_assistant_prompt("Will it rain tomorrow?")));
        assert!(prompts[0].ends_with(hits));
    }

    #[tokio::test]
    async fn empty_hits_skip_the_model() {
        let model = Arc::new(Recorder {
            prompts: Mutex::new(Vec::new()),
        });
        let exa = searcher(model.clone());
        assert!(exa.synthesize("Will it rain?", "  ").await.unwrap().is_empty());
        assert!(model.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn model_failure_is_a_provider_error() {
        let exa = searcher(Arc::new(Broken));
        let err = exa.synthesize("Will it rain?", "[1] hit").await.unwrap_err();
        assert!(matches!(err, ForecastError::ProviderUnavailable { ref provider, .. } if provider == "exa"));
    }

    #[test]
    fn formats_highlights_and_falls_back_to_text() {
        let val = json!({
            "results": [
                {
                    "title": "Storm warning issued",
                    "url": "https://news.example/storm",
                    "publishedDate": "2025-06-01T12:00:00.000Z",
                    "highlights": ["Heavy rain expected.", "Flood watch in place."]
                },
                {
                    "title": "Climate outlook",
                    "url": "https://news.example/outlook",
                    "text": "A wetter than average season."
                }
            ]
        });
        let out = format_results(&val);
        assert!(out.starts_with("[1] Storm warning issued (2025-06-01)"));
        assert!(out.contains("Heavy rain expected. ... Flood watch in place."));
        assert!(out.contains("[2] Climate outlook\nhttps://news.example/outlook\nA wetter"));
    }

    #[test]
    fn missing_results_is_empty() {
        assert!(format_results(&json!({"error": "quota"})).is_empty());
    }
}
