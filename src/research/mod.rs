//! Research brief acquisition.
//!
//! Providers are tried in a fixed precedence order. Which ones are present is
//! decided once at startup from credentials (`ResearchCapabilities`); the
//! dispatcher only ever sees configured providers.

pub mod asknews;
pub mod exa;
pub mod perplexity;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::clients::ChatCompletionsClient;
use crate::config::Config;
use crate::error::{ForecastError, Result};
use crate::question::QuestionDetails;

pub use asknews::AskNewsSearcher;
pub use exa::ExaSearcher;
pub use perplexity::PerplexityResearcher;

/// A text-producing research service
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn query(&self, question_text: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchProviderKind {
    AskNews,
    Exa,
    Perplexity,
    /// Perplexity models reached through OpenRouter
    OpenRouter,
}

impl fmt::Display for ResearchProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResearchProviderKind::AskNews => "asknews",
            ResearchProviderKind::Exa => "exa",
            ResearchProviderKind::Perplexity => "perplexity",
            ResearchProviderKind::OpenRouter => "openrouter",
        };
        f.write_str(name)
    }
}

/// What a failing configured provider means for the attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchFailurePolicy {
    /// Propagate the first provider error
    #[default]
    FailFast,
    /// Log and move on to the next configured provider
    FallbackToNext,
}

impl std::str::FromStr for ResearchFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail_fast" | "fail" => Ok(ResearchFailurePolicy::FailFast),
            "fallback_to_next" | "fallback" => Ok(ResearchFailurePolicy::FallbackToNext),
            other => Err(format!("unknown research failure policy '{}'", other)),
        }
    }
}

pub struct ResearchDispatcher {
    providers: Vec<Arc<dyn SearchProvider>>,
    policy: ResearchFailurePolicy,
}

impl ResearchDispatcher {
    pub fn new(providers: Vec<Arc<dyn SearchProvider>>, policy: ResearchFailurePolicy) -> Self {
        Self { providers, policy }
    }

    /// Dispatcher with no providers; every brief is empty
    pub fn disabled() -> Self {
        Self::new(Vec::new(), ResearchFailurePolicy::FailFast)
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(build_providers(config), config.research.failure_policy)
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Research brief for a question; empty when nothing is configured.
    pub async fn research(&self, question: &QuestionDetails) -> Result<String> {
        let url = &question.page_url;
        if self.providers.is_empty() {
            tracing::warn!(
                "No research provider found when processing question URL {}. Will pass back empty string.",
                url
            );
            return Ok(String::new());
        }

        let mut failures = 0usize;
        let mut last_err: Option<ForecastError> = None;
        for provider in &self.providers {
            match provider.query(&question.question_text).await {
                Ok(brief) if !brief.trim().is_empty() => {
                    tracing::info!(
                        "Found research for URL {} via {}:\n{}",
                        url,
                        provider.name(),
                        brief
                    );
                    return Ok(brief);
                }
                Ok(_) => {
                    tracing::warn!(
                        "{} returned empty research for {}, trying next provider",
                        provider.name(),
                        url
                    );
                }
                Err(e) => {
                    let err = as_provider_error(provider.name(), e);
                    match self.policy {
                        ResearchFailurePolicy::FailFast => return Err(err),
                        ResearchFailurePolicy::FallbackToNext => {
                            tracing::warn!("{}; falling back to next provider", err);
                            failures += 1;
                            last_err = Some(err);
                        }
                    }
                }
            }
        }

        if failures == self.providers.len()
            && let Some(err) = last_err
        {
            return Err(err);
        }
        tracing::warn!("All research providers returned empty results for {}", url);
        Ok(String::new())
    }
}

fn as_provider_error(provider: &str, err: ForecastError) -> ForecastError {
    match err {
        e @ ForecastError::ProviderUnavailable { .. } => e,
        other => ForecastError::provider(provider, other.to_string()),
    }
}

/// Shared instructions for LLM-backed research assistants
pub fn research_assistant_prompt(question_text: &str) -> String {
    format!(
        "You are an assistant to a superforecaster.\n\
         The superforecaster will give you a question they intend to forecast on.\n\
         To be a great assistant, you generate a concise but detailed rundown of the most relevant news, \
         including if the question would resolve Yes or No based on current information.\n\
         You do not produce forecasts yourself.\n\
         \n\
         Question:\n\
         {}",
        question_text
    )
}

/// Configured providers in precedence order
pub fn build_providers(config: &Config) -> Vec<Arc<dyn SearchProvider>> {
    let rt = &config.runtime;
    let research = &config.research;
    config
        .research_capabilities()
        .ordered()
        .into_iter()
        .filter_map(|kind| -> Option<Arc<dyn SearchProvider>> {
            match kind {
                ResearchProviderKind::AskNews => Some(Arc::new(AskNewsSearcher::new(
                    research,
                    rt.asknews_client_id.clone()?,
                    rt.asknews_secret.clone()?,
                ))),
                ResearchProviderKind::Exa => Some(Arc::new(ExaSearcher::new(
                    research,
                    rt.exa_api_key.clone()?,
                    Arc::new(ChatCompletionsClient::from_config(
                        &config.llm,
                        rt.llm_api_key.clone(),
                    )),
                ))),
                ResearchProviderKind::Perplexity => Some(Arc::new(PerplexityResearcher::direct(
                    research,
                    rt.perplexity_api_key.clone()?,
                ))),
                ResearchProviderKind::OpenRouter => Some(Arc::new(
                    PerplexityResearcher::via_openrouter(research, rt.openrouter_api_key.clone()?),
                )),
            }
        })
        .collect()
}
