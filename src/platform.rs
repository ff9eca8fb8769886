//! Forecasting platform access: fetching questions and publishing reports.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, RequestBuilder};
use serde_json::{Map, Value, json};

use crate::clients::http_client;
use crate::config::Config;
use crate::error::{ForecastError, Result};
use crate::prediction::{Forecast, ForecastReport};
use crate::question::{
    BinaryQuestion, MultipleChoiceQuestion, NumericQuestion, Question, QuestionDetails,
};

/// Grid size of the CDF the platform expects for continuous questions
pub const CDF_POINTS: usize = 201;

static POST_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/questions/(\d+)").expect("question url regex should compile")
});

#[async_trait]
pub trait Platform: Send + Sync {
    /// Fetch a question by numeric post id or page URL
    async fn get_question(&self, id_or_url: &str) -> Result<Question>;
    async fn submit_report(&self, report: &ForecastReport) -> Result<()>;
}

/// Post id from either a bare number or a question page URL
pub fn parse_post_id(id_or_url: &str) -> Result<u64> {
    let trimmed = id_or_url.trim();
    if let Ok(id) = trimmed.parse::<u64>() {
        return Ok(id);
    }
    POST_URL_RE
        .captures(trimmed)
        .and_then(|c| c[1].parse().ok())
        .ok_or_else(|| ForecastError::Platform {
            message: format!("'{}' is neither a question id nor a question URL", id_or_url),
        })
}

fn str_field<'a>(val: &'a Value, key: &str) -> &'a str {
    val.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

fn missing(what: &str, post_id: u64) -> ForecastError {
    ForecastError::Platform {
        message: format!("post {} has no {}", post_id, what),
    }
}

/// Map a post payload onto the matching `Question` variant
pub fn question_from_post(post: &Value, site_url: &str) -> Result<Question> {
    let post_id = post
        .get("id")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| ForecastError::Platform {
            message: "post payload has no id".to_string(),
        })?;
    let q = post.get("question").ok_or_else(|| missing("question", post_id))?;

    let title = match str_field(q, "title") {
        "" => str_field(post, "title"),
        t => t,
    };
    let details = QuestionDetails {
        id: q.get("id").and_then(|v| v.as_u64()),
        post_id: Some(post_id),
        page_url: format!("{}/questions/{}/", site_url.trim_end_matches('/'), post_id),
        question_text: title.to_string(),
        background_info: str_field(q, "description").to_string(),
        resolution_criteria: str_field(q, "resolution_criteria").to_string(),
        fine_print: str_field(q, "fine_print").to_string(),
    };

    let question = match str_field(q, "type") {
        "binary" => Question::Binary(BinaryQuestion::new(details)),
        "multiple_choice" => {
            let options: Vec<String> = q
                .get("options")
                .and_then(|o| o.as_array())
                .ok_or_else(|| missing("options", post_id))?
                .iter()
                .filter_map(|o| o.as_str().map(String::from))
                .collect();
            Question::MultipleChoice(MultipleChoiceQuestion::new(details, options)?)
        }
        "numeric" => {
            let scaling = q.get("scaling").ok_or_else(|| missing("scaling", post_id))?;
            let bound = |key: &str| {
                scaling
                    .get(key)
                    .and_then(|v| v.as_f64())
                    .ok_or_else(|| missing(key, post_id))
            };
            let unit = str_field(q, "unit").trim();
            let numeric = NumericQuestion {
                details,
                lower_bound: bound("range_min")?,
                upper_bound: bound("range_max")?,
                open_lower_bound: q.get("open_lower_bound").and_then(|v| v.as_bool()).unwrap_or(false),
                open_upper_bound: q.get("open_upper_bound").and_then(|v| v.as_bool()).unwrap_or(false),
                unit_of_measure: (!unit.is_empty()).then(|| unit.to_string()),
            };
            numeric.validate()?;
            Question::Numeric(numeric)
        }
        other => {
            return Err(ForecastError::Platform {
                message: format!("post {} has unsupported question type '{}'", post_id, other),
            });
        }
    };
    Ok(question)
}

/// Forecast submission body for one report
pub fn forecast_payload(report: &ForecastReport) -> Result<Value> {
    let question_id = report.question_id.ok_or_else(|| ForecastError::Platform {
        message: format!("report for {} has no question id", report.page_url),
    })?;
    let mut entry = Map::new();
    entry.insert("question".into(), json!(question_id));
    match &report.forecast {
        Forecast::Binary(p) => {
            entry.insert("probability_yes".into(), json!(p.prediction_value));
        }
        Forecast::MultipleChoice(p) => {
            let per_category: Map<String, Value> = p
                .prediction_value
                .predicted_options
                .iter()
                .map(|o| (o.option_name.clone(), json!(o.probability)))
                .collect();
            entry.insert("probability_yes_per_category".into(), Value::Object(per_category));
        }
        Forecast::Numeric(p) => {
            entry.insert(
                "continuous_cdf".into(),
                json!(p.prediction_value.cdf(CDF_POINTS)),
            );
        }
    }
    Ok(Value::Array(vec![Value::Object(entry)]))
}

/// Private comment carrying the summary and full reasoning
pub fn comment_payload(report: &ForecastReport) -> Result<Value> {
    let post_id = report.post_id.ok_or_else(|| ForecastError::Platform {
        message: format!("report for {} has no post id", report.page_url),
    })?;
    let text = format!(
        "Forecast ({}): {}\n\n{}",
        report.model,
        report.forecast.summary(),
        report.forecast.reasoning()
    );
    Ok(json!({
        "text": text,
        "parent": null,
        "included_forecast": true,
        "is_private": true,
        "on_post": post_id,
    }))
}

pub struct MetaculusClient {
    base_url: String,
    site_url: String,
    token: Option<String>,
    client: Client,
}

impl MetaculusClient {
    pub fn new(base_url: &str, token: Option<String>, timeout_ms: u64) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        let site_url = base_url.trim_end_matches("/api").to_string();
        let client = http_client(timeout_ms);
        Self {
            base_url,
            site_url,
            token,
            client,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.platform.base_url,
            config.runtime.metaculus_token.clone(),
            config.platform.timeout_ms,
        )
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(t) => req.header("Authorization", format!("Token {}", t)),
            None => req,
        }
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<()> {
        if self.token.is_none() {
            return Err(ForecastError::Config {
                message: "METACULUS_TOKEN is required to publish".to_string(),
            });
        }
        let resp = self
            .authed(self.client.post(format!("{}{}", self.base_url, path)))
            .json(body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ForecastError::Platform {
                message: format!("POST {} returned {}: {}", path, status, text),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Platform for MetaculusClient {
    async fn get_question(&self, id_or_url: &str) -> Result<Question> {
        let post_id = parse_post_id(id_or_url)?;
        let resp = self
            .authed(self.client.get(format!("{}/posts/{}/", self.base_url, post_id)))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ForecastError::Platform {
                message: format!("fetching post {} returned {}", post_id, status),
            });
        }
        let post: Value = resp.json().await?;
        question_from_post(&post, &self.site_url)
    }

    async fn submit_report(&self, report: &ForecastReport) -> Result<()> {
        let forecast = forecast_payload(report)?;
        let comment = comment_payload(report)?;
        self.post_json("/questions/forecast/", &forecast).await?;
        tracing::info!("Submitted forecast for {}", report.page_url);
        self.post_json("/comments/create/", &comment).await?;
        tracing::info!("Posted reasoning comment for {}", report.page_url);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prediction::{
        NumericDistribution, Percentile, PredictedOption, PredictedOptionList, ReasonedPrediction,
    };

    const SITE: &str = "https://www.metaculus.com";

    fn post(question: Value) -> Value {
        json!({"id": 3001, "title": "Post title", "question": question})
    }

    fn report(forecast: Forecast) -> ForecastReport {
        ForecastReport {
            question_id: Some(77),
            post_id: Some(3001),
            page_url: format!("{}/questions/3001/", SITE),
            model: "test-model".into(),
            research: String::new(),
            forecast,
        }
    }

    #[test]
    fn post_id_from_number_or_url() {
        assert_eq!(parse_post_id("3001").unwrap(), 3001);
        assert_eq!(
            parse_post_id("https://www.metaculus.com/questions/3001/will-it-rain/").unwrap(),
            3001
        );
        assert!(parse_post_id("https://www.metaculus.com/notebooks/").is_err());
    }

    #[test]
    fn binary_post_maps_details() {
        let q = question_from_post(
            &post(json!({
                "id": 77,
                "type": "binary",
                "title": "Will it rain?",
                "description": "Background here.",
                "resolution_criteria": "Official gauge.",
                "fine_print": ""
            })),
            SITE,
        )
        .unwrap();
        let Question::Binary(b) = q else {
            panic!("expected binary question");
        };
        assert_eq!(b.details.id, Some(77));
        assert_eq!(b.details.post_id, Some(3001));
        assert_eq!(b.details.page_url, "https://www.metaculus.com/questions/3001/");
        assert_eq!(b.details.background_info, "Background here.");
    }

    #[test]
    fn multiple_choice_keeps_option_order() {
        let q = question_from_post(
            &post(json!({"id": 78, "type": "multiple_choice", "options": ["B", "A", "C"]})),
            SITE,
        )
        .unwrap();
        let Question::MultipleChoice(mc) = q else {
            panic!("expected multiple choice question");
        };
        assert_eq!(mc.options, vec!["B", "A", "C"]);
        assert_eq!(mc.details.question_text, "Post title");
    }

    #[test]
    fn numeric_reads_scaling_and_bounds() {
        let q = question_from_post(
            &post(json!({
                "id": 79,
                "type": "numeric",
                "title": "How many?",
                "scaling": {"range_min": 0.0, "range_max": 500.0},
                "open_lower_bound": false,
                "open_upper_bound": true,
                "unit": "cases"
            })),
            SITE,
        )
        .unwrap();
        let Question::Numeric(n) = q else {
            panic!("expected numeric question");
        };
        assert_eq!((n.lower_bound, n.upper_bound), (0.0, 500.0));
        assert!(n.open_upper_bound && !n.open_lower_bound);
        assert_eq!(n.unit_of_measure.as_deref(), Some("cases"));
    }

    #[test]
    fn unsupported_type_is_platform_error() {
        let err = question_from_post(&post(json!({"id": 80, "type": "date"})), SITE).unwrap_err();
        assert!(matches!(err, ForecastError::Platform { .. }));
    }

    #[test]
    fn payload_shapes_per_forecast_type() {
        let binary = forecast_payload(&report(Forecast::Binary(ReasonedPrediction::new(0.37, "r"))))
            .unwrap();
        assert_eq!(binary[0]["question"], 77);
        assert_eq!(binary[0]["probability_yes"], 0.37);

        let list = PredictedOptionList {
            predicted_options: vec![
                PredictedOption { option_name: "A".into(), probability: 0.25 },
                PredictedOption { option_name: "B".into(), probability: 0.75 },
            ],
        };
        let mc = forecast_payload(&report(Forecast::MultipleChoice(ReasonedPrediction::new(list, "r"))))
            .unwrap();
        assert_eq!(mc[0]["probability_yes_per_category"]["B"], 0.75);

        let dist = NumericDistribution {
            declared_percentiles: vec![
                Percentile { percentile: 10, value: 100.0 },
                Percentile { percentile: 50, value: 250.0 },
                Percentile { percentile: 90, value: 400.0 },
            ],
            lower_bound: 0.0,
            upper_bound: 500.0,
            open_lower_bound: false,
            open_upper_bound: false,
            unit_of_measure: None,
        };
        let numeric = forecast_payload(&report(Forecast::Numeric(ReasonedPrediction::new(dist, "r"))))
            .unwrap();
        let cdf = numeric[0]["continuous_cdf"].as_array().unwrap();
        assert_eq!(cdf.len(), CDF_POINTS);
    }

    #[test]
    fn comment_is_private_and_carries_reasoning() {
        let r = report(Forecast::Binary(ReasonedPrediction::new(0.4, "Because of X.")));
        let c = comment_payload(&r).unwrap();
        assert_eq!(c["is_private"], true);
        assert_eq!(c["on_post"], 3001);
        let text = c["text"].as_str().unwrap();
        assert!(text.contains("40.0%") && text.ends_with("Because of X."));
    }

    #[test]
    fn missing_question_id_blocks_submission() {
        let mut r = report(Forecast::Binary(ReasonedPrediction::new(0.4, "r")));
        r.question_id = None;
        assert!(forecast_payload(&r).is_err());
    }
}
