use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use forecast_mind::clients::{AgentError, LanguageModel};
use forecast_mind::extract::{ExtractionSettings, MissingOptionPolicy};
use forecast_mind::research::{ResearchDispatcher, ResearchFailurePolicy, SearchProvider};
use forecast_mind::{
    BinaryQuestion, Forecast, ForecastError, Forecaster, MultipleChoiceQuestion, NumericQuestion,
    Question, QuestionDetails,
};
use tokio::sync::Semaphore;

/// Replies with the same text every time, optionally after a delay
struct FakeModel {
    reply: String,
    delay: Duration,
    prompts: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeModel {
    fn new(reply: &str) -> Arc<Self> {
        Self::slow(reply, Duration::ZERO)
    }

    fn slow(reply: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            delay,
            prompts: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl LanguageModel for FakeModel {
    async fn invoke(&self, prompt: &str) -> Result<String, AgentError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }

    fn model_name(&self) -> &str {
        "fake-model"
    }
}

struct FailingModel;

#[async_trait]
impl LanguageModel for FailingModel {
    async fn invoke(&self, _prompt: &str) -> Result<String, AgentError> {
        Err(AgentError::Timeout { timeout_ms: 10 })
    }

    fn model_name(&self) -> &str {
        "failing-model"
    }
}

struct StaticNews(&'static str);

#[async_trait]
impl SearchProvider for StaticNews {
    fn name(&self) -> &str {
        "static"
    }

    async fn query(&self, _question_text: &str) -> forecast_mind::Result<String> {
        Ok(self.0.to_string())
    }
}

fn forecaster(model: Arc<dyn LanguageModel>, research: ResearchDispatcher, capacity: usize) -> Forecaster {
    Forecaster::new(
        model,
        Arc::new(research),
        Arc::new(Semaphore::new(capacity)),
        ExtractionSettings::default(),
    )
    .with_today(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap())
}

fn details(text: &str, url: &str) -> QuestionDetails {
    QuestionDetails {
        question_text: text.into(),
        page_url: url.into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn binary_end_to_end_with_research() {
    let reply = "(a) Six months.\n(b) No.\nBuckets...\nProbability: 37%";
    let model = FakeModel::new(reply);
    let news: Arc<dyn SearchProvider> = Arc::new(StaticNews("Storms forecast all week."));
    let research = ResearchDispatcher::new(vec![news], ResearchFailurePolicy::FailFast);
    let f = forecaster(model.clone(), research, 2);

    let q = Question::Binary(BinaryQuestion::new(details("Will it rain?", "https://example.org/q/1")));
    let report = f.report(&q).await.unwrap();

    assert_eq!(report.research, "Storms forecast all week.");
    let Forecast::Binary(p) = &report.forecast else {
        panic!("expected binary forecast");
    };
    assert!((p.prediction_value - 0.37).abs() < 1e-12);
    assert_eq!(p.reasoning, reply);

    let prompts = model.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Storms forecast all week."));
    assert!(prompts[0].contains("Today is 2025-06-01."));
}

#[tokio::test]
async fn multiple_choice_routes_to_option_extractor() {
    let model = FakeModel::new("Consolidated.\nGreen: 30%\nRed: 20%\nBlue: 50%");
    let f = forecaster(model, ResearchDispatcher::disabled(), 2);
    let q = MultipleChoiceQuestion::new(
        details("Which colour?", "https://example.org/q/2"),
        vec!["Red".into(), "Green".into(), "Blue".into()],
    )
    .unwrap();

    let p = f.forecast_multiple_choice(&q).await.unwrap();
    assert_eq!(p.prediction_value.labels(), vec!["Red", "Green", "Blue"]);
    assert!((p.prediction_value.total() - 1.0).abs() < 1e-9);
    assert!((p.prediction_value.probability_of("Blue").unwrap() - 0.5).abs() < 1e-9);
}

#[tokio::test]
async fn missing_option_policy_flows_from_settings() {
    let model = FakeModel::new("Red: 40%\nGreen: 60%");
    let q = MultipleChoiceQuestion::new(
        details("Which colour?", "https://example.org/q/2"),
        vec!["Red".into(), "Green".into(), "Blue".into()],
    )
    .unwrap();

    let strict = forecaster(model.clone(), ResearchDispatcher::disabled(), 1);
    assert!(strict.forecast_multiple_choice(&q).await.unwrap_err().is_extraction());

    let lenient = Forecaster::new(
        model,
        Arc::new(ResearchDispatcher::disabled()),
        Arc::new(Semaphore::new(1)),
        ExtractionSettings {
            missing_option_policy: MissingOptionPolicy::AssignFloor,
            ..Default::default()
        },
    );
    let p = lenient.forecast_multiple_choice(&q).await.unwrap();
    assert!((p.prediction_value.probability_of("Blue").unwrap() - 0.001).abs() < 1e-12);
}

#[tokio::test]
async fn numeric_routes_to_percentile_extractor() {
    let reply = "Units confirmed.\nPercentile 10: 120\nPercentile 20: 150\nPercentile 40: 190\n\
                 Percentile 50: 210\nPercentile 60: 230\nPercentile 80: 280\nPercentile 90: 9,000";
    let model = FakeModel::new(reply);
    let f = forecaster(model.clone(), ResearchDispatcher::disabled(), 2);
    let q = NumericQuestion {
        details: details("How many?", "https://example.org/q/3"),
        lower_bound: 100.0,
        upper_bound: 500.0,
        open_lower_bound: false,
        open_upper_bound: false,
        unit_of_measure: Some("cases".into()),
    };

    let p = f.forecast(&Question::Numeric(q)).await.unwrap();
    let Forecast::Numeric(p) = p else {
        panic!("expected numeric forecast");
    };
    let dist = &p.prediction_value;
    assert_eq!(dist.declared_percentiles.len(), 7);
    assert_eq!(dist.value_at(50), Some(210.0));
    // Closed upper bound clips the runaway tail
    assert_eq!(dist.value_at(90), Some(500.0));
    assert!(model.prompts.lock().unwrap()[0].contains("The outcome can not be higher than 500."));
}

#[tokio::test]
async fn model_failure_becomes_invocation_error() {
    let f = forecaster(Arc::new(FailingModel), ResearchDispatcher::disabled(), 1);
    let q = BinaryQuestion::new(details("Will it rain?", "https://example.org/q/4"));
    let err = f.forecast_binary(&q).await.unwrap_err();
    assert!(matches!(err, ForecastError::Timeout { .. } | ForecastError::Invocation { .. }));
}

#[tokio::test]
async fn gate_bounds_questions_in_flight() {
    let model = FakeModel::slow("Probability: 50%", Duration::from_millis(30));
    let f = forecaster(model.clone(), ResearchDispatcher::disabled(), 2);
    let questions: Vec<Question> = (0..6)
        .map(|i| {
            Question::Binary(BinaryQuestion::new(details(
                "Will it rain?",
                &format!("https://example.org/q/{}", i),
            )))
        })
        .collect();

    let results = f.report_all(&questions).await;
    assert_eq!(results.len(), 6);
    assert!(results.iter().all(|r| r.is_ok()));
    assert!(model.max_in_flight.load(Ordering::SeqCst) <= 2);
    assert_eq!(model.prompts.lock().unwrap().len(), 6);
    assert_eq!(f.gate().available_permits(), 2);
}

#[tokio::test]
async fn one_failed_question_does_not_sink_the_batch() {
    let model = FakeModel::new("Probability: 64%");
    let f = forecaster(model, ResearchDispatcher::disabled(), 2);
    let bad = MultipleChoiceQuestion {
        details: details("Broken", "https://example.org/q/bad"),
        options: vec![],
    };
    let questions = vec![
        Question::Binary(BinaryQuestion::new(details("Will it rain?", "https://example.org/q/ok"))),
        Question::MultipleChoice(bad),
    ];

    let results = f.report_all(&questions).await;
    assert!(results[0].is_ok());
    assert!(results[1].is_err());
}
