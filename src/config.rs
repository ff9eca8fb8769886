use serde::{Deserialize, Serialize};

use crate::extract::{
    DEFAULT_MIN_PERCENTILE_POINTS, DEFAULT_OPTION_FLOOR, ExtractionSettings, MissingOptionPolicy,
    ProbabilityBand,
};
use crate::research::{ResearchFailurePolicy, ResearchProviderKind};

/// Main configuration structure loaded from forecast_mind.toml and environment variables
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub research: ResearchConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
    /// Runtime configuration loaded from environment variables
    #[serde(skip)]
    pub runtime: RuntimeConfig,
}

/// Forecasting model endpoint (any OpenAI-compatible chat completions API)
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub timeout_ms: u64,
    pub allowed_tries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "openai/o4-mini".to_string(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            // o4-mini only accepts temperature 1
            temperature: 1.0,
            timeout_ms: 200_000,
            allowed_tries: 2,
        }
    }
}

/// Pipeline and extraction behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub max_concurrent_questions: usize,
    /// [min, max] a binary probability is clamped into
    pub probability_band: ProbabilityBand,
    pub option_floor: f64,
    pub missing_option_policy: MissingOptionPolicy,
    pub min_percentile_points: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            max_concurrent_questions: 2,
            probability_band: ProbabilityBand::default(),
            option_floor: DEFAULT_OPTION_FLOOR,
            missing_option_policy: MissingOptionPolicy::Fail,
            min_percentile_points: DEFAULT_MIN_PERCENTILE_POINTS,
        }
    }
}

impl ForecastConfig {
    pub fn extraction(&self) -> ExtractionSettings {
        ExtractionSettings {
            band: self.probability_band,
            option_floor: self.option_floor,
            missing_option_policy: self.missing_option_policy,
            min_percentile_points: self.min_percentile_points,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResearchConfig {
    pub failure_policy: ResearchFailurePolicy,
    pub timeout_ms: u64,
    pub perplexity_base_url: String,
    pub perplexity_model: String,
    pub openrouter_base_url: String,
    pub openrouter_model: String,
    pub asknews_base_url: String,
    pub asknews_token_url: String,
    pub asknews_articles: usize,
    pub exa_base_url: String,
    pub exa_results: usize,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            failure_policy: ResearchFailurePolicy::FailFast,
            timeout_ms: 120_000,
            perplexity_base_url: "https://api.perplexity.ai".to_string(),
            // sonar and sonar-reasoning are cheaper but only run one search
            perplexity_model: "sonar-pro".to_string(),
            openrouter_base_url: "https://openrouter.ai/api/v1".to_string(),
            openrouter_model: "perplexity/sonar-reasoning".to_string(),
            asknews_base_url: "https://api.asknews.app/v1".to_string(),
            asknews_token_url: "https://auth.asknews.app/oauth2/token".to_string(),
            asknews_articles: 10,
            exa_base_url: "https://api.exa.ai".to_string(),
            exa_results: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.metaculus.com/api".to_string(),
            timeout_ms: 30_000,
        }
    }
}

/// Runtime configuration loaded from environment variables
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    pub llm_api_key: Option<String>,
    pub asknews_client_id: Option<String>,
    pub asknews_secret: Option<String>,
    pub exa_api_key: Option<String>,
    pub perplexity_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub metaculus_token: Option<String>,
    pub log_level: String,
}

/// Which research providers have credentials, resolved once at startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResearchCapabilities {
    pub asknews: bool,
    pub exa: bool,
    pub perplexity: bool,
    pub openrouter: bool,
}

impl ResearchCapabilities {
    pub fn from_runtime(rt: &RuntimeConfig) -> Self {
        Self {
            asknews: rt.asknews_client_id.is_some() && rt.asknews_secret.is_some(),
            exa: rt.exa_api_key.is_some(),
            perplexity: rt.perplexity_api_key.is_some(),
            openrouter: rt.openrouter_api_key.is_some(),
        }
    }

    /// Configured providers in precedence order
    pub fn ordered(&self) -> Vec<ResearchProviderKind> {
        [
            (self.asknews, ResearchProviderKind::AskNews),
            (self.exa, ResearchProviderKind::Exa),
            (self.perplexity, ResearchProviderKind::Perplexity),
            (self.openrouter, ResearchProviderKind::OpenRouter),
        ]
        .into_iter()
        .filter_map(|(enabled, kind)| enabled.then_some(kind))
        .collect()
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl RuntimeConfig {
    /// Load runtime configuration from environment variables
    pub fn load_from_env() -> Self {
        let openrouter_api_key = non_empty_env("OPENROUTER_API_KEY");
        Self {
            // LLM_API_KEY wins; OpenRouter key doubles as the default model key
            llm_api_key: non_empty_env("LLM_API_KEY").or_else(|| openrouter_api_key.clone()),
            asknews_client_id: non_empty_env("ASKNEWS_CLIENT_ID"),
            asknews_secret: non_empty_env("ASKNEWS_SECRET"),
            exa_api_key: non_empty_env("EXA_API_KEY"),
            perplexity_api_key: non_empty_env("PERPLEXITY_API_KEY"),
            openrouter_api_key,
            metaculus_token: non_empty_env("METACULUS_TOKEN"),
            log_level: std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "forecast_mind=info".to_string()),
        }
    }
}

impl Config {
    /// Load configuration from TOML file and environment variables
    /// Uses FORECAST_MIND_CONFIG environment variable or defaults to "forecast_mind.toml"
    pub fn load() -> anyhow::Result<Self> {
        // FORECAST_ENV_FILE if set, else ./.env
        if let Ok(env_path) = std::env::var("FORECAST_ENV_FILE") {
            let _ = dotenvy::from_path(env_path);
        } else {
            let _ = dotenvy::dotenv();
        }

        let config_path = std::env::var("FORECAST_MIND_CONFIG")
            .unwrap_or_else(|_| "forecast_mind.toml".to_string());

        let mut config: Config = if let Ok(content) = std::fs::read_to_string(&config_path) {
            Self::from_toml_str(&content)?
        } else {
            tracing::debug!("Config file {} not found, using defaults", config_path);
            Self::default()
        };

        config.apply_env_overrides();
        config.runtime = RuntimeConfig::load_from_env();
        config.validate()?;

        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// FORECAST_* variables override file values
    pub fn apply_env_overrides(&mut self) {
        if let Some(model) = non_empty_env("FORECAST_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(url) = non_empty_env("FORECAST_LLM_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(timeout) = non_empty_env("FORECAST_LLM_TIMEOUT_MS").and_then(|v| v.parse().ok())
        {
            self.llm.timeout_ms = timeout;
        }
        if let Some(tries) = non_empty_env("FORECAST_LLM_ALLOWED_TRIES").and_then(|v| v.parse().ok())
        {
            self.llm.allowed_tries = tries;
        }
        if let Some(n) = non_empty_env("FORECAST_MAX_CONCURRENT").and_then(|v| v.parse().ok()) {
            self.forecast.max_concurrent_questions = n;
        }
        if let Some(policy) = non_empty_env("FORECAST_MISSING_OPTION_POLICY") {
            match policy.parse() {
                Ok(p) => self.forecast.missing_option_policy = p,
                Err(e) => tracing::warn!("ignoring FORECAST_MISSING_OPTION_POLICY: {}", e),
            }
        }
        if let Some(policy) = non_empty_env("FORECAST_RESEARCH_FAILURE_POLICY") {
            match policy.parse() {
                Ok(p) => self.research.failure_policy = p,
                Err(e) => tracing::warn!("ignoring FORECAST_RESEARCH_FAILURE_POLICY: {}", e),
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.forecast.max_concurrent_questions == 0 {
            anyhow::bail!("forecast.max_concurrent_questions must be at least 1");
        }
        if !(0.0..0.1).contains(&self.forecast.option_floor) {
            anyhow::bail!("forecast.option_floor must be in [0, 0.1)");
        }
        if self.forecast.min_percentile_points == 0 {
            anyhow::bail!("forecast.min_percentile_points must be at least 1");
        }
        if self.llm.allowed_tries == 0 {
            anyhow::bail!("llm.allowed_tries must be at least 1");
        }
        if !self.llm.base_url.starts_with("http://") && !self.llm.base_url.starts_with("https://")
        {
            anyhow::bail!("llm.base_url must be an http(s) URL, got '{}'", self.llm.base_url);
        }
        if self.llm.timeout_ms == 0 {
            anyhow::bail!("llm.timeout_ms must be > 0");
        }
        Ok(())
    }

    pub fn research_capabilities(&self) -> ResearchCapabilities {
        ResearchCapabilities::from_runtime(&self.runtime)
    }
}
