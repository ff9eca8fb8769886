//! Search-augmented LLM research (Perplexity, directly or via OpenRouter)

use std::sync::Arc;

use async_trait::async_trait;

use super::{SearchProvider, research_assistant_prompt};
use crate::clients::{ChatCompletionsClient, LanguageModel};
use crate::config::ResearchConfig;
use crate::error::{ForecastError, Result};

const RESEARCH_TEMPERATURE: f32 = 0.1;

pub struct PerplexityResearcher {
    name: String,
    model: Arc<dyn LanguageModel>,
}

impl PerplexityResearcher {
    pub fn new(name: impl Into<String>, model: Arc<dyn LanguageModel>) -> Self {
        Self {
            name: name.into(),
            model,
        }
    }

    pub fn direct(cfg: &ResearchConfig, api_key: String) -> Self {
        let client =
            ChatCompletionsClient::new(&cfg.perplexity_base_url, cfg.perplexity_model.clone(), Some(api_key))
                .with_temperature(RESEARCH_TEMPERATURE)
                .with_timeout_ms(cfg.timeout_ms);
        Self::new("perplexity", Arc::new(client))
    }

    pub fn via_openrouter(cfg: &ResearchConfig, api_key: String) -> Self {
        let client = ChatCompletionsClient::new(
            &cfg.openrouter_base_url,
            cfg.openrouter_model.clone(),
            Some(api_key),
        )
        .with_temperature(RESEARCH_TEMPERATURE)
        .with_timeout_ms(cfg.timeout_ms);
        Self::new("openrouter", Arc::new(client))
    }
}

#[async_trait]
impl SearchProvider for PerplexityResearcher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, question_text: &str) -> Result<String> {
        let prompt = research_assistant_prompt(question_text);
        self.model
            .invoke(&prompt)
            .await
            .map_err(|e| ForecastError::provider(&self.name, e.to_string()))
    }
}
