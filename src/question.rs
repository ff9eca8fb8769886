//! Forecasting questions as fetched from the platform.
//!
//! Each variant carries exactly the fields its prompt template and extractor
//! need, so a binary question can never be routed to the percentile parser.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};
use crate::extract::options::normalize_label;

/// Fields shared by every question variant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionDetails {
    /// Platform question id (what forecasts are submitted against)
    #[serde(default)]
    pub id: Option<u64>,
    /// Platform post id (what the page URL and comments refer to)
    #[serde(default)]
    pub post_id: Option<u64>,
    #[serde(default)]
    pub page_url: String,
    pub question_text: String,
    #[serde(default)]
    pub background_info: String,
    #[serde(default)]
    pub resolution_criteria: String,
    #[serde(default)]
    pub fine_print: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryQuestion {
    #[serde(flatten)]
    pub details: QuestionDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultipleChoiceQuestion {
    #[serde(flatten)]
    pub details: QuestionDetails,
    /// Ordered, distinct option labels
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericQuestion {
    #[serde(flatten)]
    pub details: QuestionDetails,
    pub lower_bound: f64,
    pub upper_bound: f64,
    #[serde(default)]
    pub open_lower_bound: bool,
    #[serde(default)]
    pub open_upper_bound: bool,
    #[serde(default)]
    pub unit_of_measure: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Question {
    Binary(BinaryQuestion),
    MultipleChoice(MultipleChoiceQuestion),
    Numeric(NumericQuestion),
}

impl BinaryQuestion {
    pub fn new(details: QuestionDetails) -> Self {
        Self { details }
    }
}

impl MultipleChoiceQuestion {
    pub fn new(details: QuestionDetails, options: Vec<String>) -> Result<Self> {
        let q = Self { details, options };
        q.validate()?;
        Ok(q)
    }

    pub fn validate(&self) -> Result<()> {
        if self.options.is_empty() {
            return Err(ForecastError::Validation {
                message: format!("question {} has no options", self.details.page_url),
            });
        }
        let mut seen = HashSet::new();
        for option in &self.options {
            let key = normalize_label(option);
            if key.is_empty() {
                return Err(ForecastError::Validation {
                    message: "option labels must not be blank".to_string(),
                });
            }
            if !seen.insert(key) {
                return Err(ForecastError::Validation {
                    message: format!("duplicate option label '{}'", option),
                });
            }
        }
        Ok(())
    }
}

impl NumericQuestion {
    pub fn validate(&self) -> Result<()> {
        if !self.lower_bound.is_finite() || !self.upper_bound.is_finite() {
            return Err(ForecastError::Validation {
                message: "numeric bounds must be finite".to_string(),
            });
        }
        if self.lower_bound >= self.upper_bound {
            return Err(ForecastError::Validation {
                message: format!(
                    "lower bound {} is not below upper bound {}",
                    self.lower_bound, self.upper_bound
                ),
            });
        }
        Ok(())
    }

    /// Hint lines for closed bounds: (upper, lower); empty when the side is open
    pub fn bound_messages(&self) -> (String, String) {
        let upper = if self.open_upper_bound {
            String::new()
        } else {
            format!("The outcome can not be higher than {}.", self.upper_bound)
        };
        let lower = if self.open_lower_bound {
            String::new()
        } else {
            format!("The outcome can not be lower than {}.", self.lower_bound)
        };
        (upper, lower)
    }
}

impl Question {
    pub fn details(&self) -> &QuestionDetails {
        match self {
            Question::Binary(q) => &q.details,
            Question::MultipleChoice(q) => &q.details,
            Question::Numeric(q) => &q.details,
        }
    }

    pub fn question_text(&self) -> &str {
        &self.details().question_text
    }

    pub fn page_url(&self) -> &str {
        &self.details().page_url
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Question::Binary(_) => "binary",
            Question::MultipleChoice(_) => "multiple_choice",
            Question::Numeric(_) => "numeric",
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.question_text().trim().is_empty() {
            return Err(ForecastError::Validation {
                message: "question text is empty".to_string(),
            });
        }
        match self {
            Question::Binary(_) => Ok(()),
            Question::MultipleChoice(q) => q.validate(),
            Question::Numeric(q) => q.validate(),
        }
    }
}
