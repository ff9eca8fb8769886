//! Forecast orchestration: gate → research → prompt → model → extractor.
//!
//! A `Forecaster` owns no mutable state besides the shared concurrency gate.
//! Each attempt holds one gate permit from the start of research until the
//! extractor returns, so at most `capacity` questions are in flight.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use futures_util::future::join_all;
use tokio::sync::Semaphore;

use crate::clients::LanguageModel;
use crate::config::Config;
use crate::error::{ForecastError, Result};
use crate::extract::{
    ExtractionSettings, extract_last_percentage_value, extract_numeric_distribution,
    extract_option_list,
};
use crate::prediction::{
    Forecast, ForecastReport, NumericDistribution, PredictedOptionList, ReasonedPrediction,
};
use crate::prompts;
use crate::question::{
    BinaryQuestion, MultipleChoiceQuestion, NumericQuestion, Question, QuestionDetails,
};
use crate::research::ResearchDispatcher;

/// Research brief plus the prediction it led to
struct Attempt<T> {
    research: String,
    prediction: ReasonedPrediction<T>,
}

pub struct Forecaster {
    model: Arc<dyn LanguageModel>,
    research: Arc<ResearchDispatcher>,
    gate: Arc<Semaphore>,
    settings: ExtractionSettings,
    today: Option<NaiveDate>,
}

impl Forecaster {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        research: Arc<ResearchDispatcher>,
        gate: Arc<Semaphore>,
        settings: ExtractionSettings,
    ) -> Self {
        Self {
            model,
            research,
            gate,
            settings,
            today: None,
        }
    }

    pub fn from_config(config: &Config, model: Arc<dyn LanguageModel>) -> Self {
        Self::new(
            model,
            Arc::new(ResearchDispatcher::from_config(config)),
            Arc::new(Semaphore::new(config.forecast.max_concurrent_questions)),
            config.forecast.extraction(),
        )
    }

    /// Pin the date stamp written into prompts
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn gate(&self) -> &Arc<Semaphore> {
        &self.gate
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }

    async fn attempt<T>(
        &self,
        details: &QuestionDetails,
        build_prompt: impl FnOnce(&str, NaiveDate) -> String,
        extract: impl FnOnce(&str) -> Result<T>,
    ) -> Result<Attempt<T>> {
        let _permit = self.gate.acquire().await.map_err(|_| ForecastError::Internal {
            message: "forecast gate closed".to_string(),
        })?;

        let research = self.research.research(details).await?;
        let prompt = build_prompt(&research, self.today());
        tracing::debug!(
            "Invoking {} for {} ({} prompt chars)",
            self.model.model_name(),
            details.page_url,
            prompt.len()
        );
        let reasoning = self.model.invoke(&prompt).await?;
        let value = extract(&reasoning).inspect_err(|e| {
            tracing::error!("Extraction failed for {}: {}", details.page_url, e);
        })?;
        Ok(Attempt {
            research,
            prediction: ReasonedPrediction::new(value, reasoning),
        })
    }

    async fn attempt_binary(&self, question: &BinaryQuestion) -> Result<Attempt<f64>> {
        let band = self.settings.band;
        let attempt = self
            .attempt(
                &question.details,
                |research, today| prompts::binary_prompt(question, research, today),
                |text| extract_last_percentage_value(text, band),
            )
            .await?;
        tracing::info!(
            "Forecasted URL {} as {} with reasoning:\n{}",
            question.details.page_url,
            attempt.prediction.prediction_value,
            attempt.prediction.reasoning
        );
        Ok(attempt)
    }

    async fn attempt_multiple_choice(
        &self,
        question: &MultipleChoiceQuestion,
    ) -> Result<Attempt<PredictedOptionList>> {
        question.validate()?;
        let floor = self.settings.option_floor;
        let policy = self.settings.missing_option_policy;
        let attempt = self
            .attempt(
                &question.details,
                |research, today| prompts::multiple_choice_prompt(question, research, today),
                |text| extract_option_list(text, &question.options, floor, policy),
            )
            .await?;
        tracing::info!(
            "Forecasted URL {} as {:?} with reasoning:\n{}",
            question.details.page_url,
            attempt.prediction.prediction_value.predicted_options,
            attempt.prediction.reasoning
        );
        Ok(attempt)
    }

    async fn attempt_numeric(
        &self,
        question: &NumericQuestion,
    ) -> Result<Attempt<NumericDistribution>> {
        question.validate()?;
        let min_points = self.settings.min_percentile_points;
        let attempt = self
            .attempt(
                &question.details,
                |research, today| prompts::numeric_prompt(question, research, today),
                |text| extract_numeric_distribution(text, question, min_points),
            )
            .await?;
        tracing::info!(
            "Forecasted URL {} as {:?} with reasoning:\n{}",
            question.details.page_url,
            attempt.prediction.prediction_value.declared_percentiles,
            attempt.prediction.reasoning
        );
        Ok(attempt)
    }

    pub async fn forecast_binary(
        &self,
        question: &BinaryQuestion,
    ) -> Result<ReasonedPrediction<f64>> {
        Ok(self.attempt_binary(question).await?.prediction)
    }

    pub async fn forecast_multiple_choice(
        &self,
        question: &MultipleChoiceQuestion,
    ) -> Result<ReasonedPrediction<PredictedOptionList>> {
        Ok(self.attempt_multiple_choice(question).await?.prediction)
    }

    pub async fn forecast_numeric(
        &self,
        question: &NumericQuestion,
    ) -> Result<ReasonedPrediction<NumericDistribution>> {
        Ok(self.attempt_numeric(question).await?.prediction)
    }

    async fn attempt_any(&self, question: &Question) -> Result<(String, Forecast)> {
        Ok(match question {
            Question::Binary(q) => {
                let a = self.attempt_binary(q).await?;
                (a.research, Forecast::Binary(a.prediction))
            }
            Question::MultipleChoice(q) => {
                let a = self.attempt_multiple_choice(q).await?;
                (a.research, Forecast::MultipleChoice(a.prediction))
            }
            Question::Numeric(q) => {
                let a = self.attempt_numeric(q).await?;
                (a.research, Forecast::Numeric(a.prediction))
            }
        })
    }

    /// Route a question to the prompt and extractor for its type
    pub async fn forecast(&self, question: &Question) -> Result<Forecast> {
        Ok(self.attempt_any(question).await?.1)
    }

    /// Forecast plus the metadata needed to publish it
    pub async fn report(&self, question: &Question) -> Result<ForecastReport> {
        let (research, forecast) = self.attempt_any(question).await?;
        Ok(ForecastReport {
            question_id: question.details().id,
            post_id: question.details().post_id,
            page_url: question.page_url().to_string(),
            model: self.model.model_name().to_string(),
            research,
            forecast,
        })
    }

    /// Forecast every question concurrently through the gate. Results keep
    /// input order; one failure does not affect the others.
    pub async fn report_all(&self, questions: &[Question]) -> Vec<Result<ForecastReport>> {
        let results = join_all(questions.iter().map(|q| self.report(q))).await;
        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            tracing::warn!("{} of {} questions failed to forecast", failed, questions.len());
        }
        results
    }
}
