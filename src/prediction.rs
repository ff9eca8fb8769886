//! Structured predictions produced from model text.

use serde::{Deserialize, Serialize};

/// Structured value paired with the raw model text it was extracted from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasonedPrediction<T> {
    pub prediction_value: T,
    pub reasoning: String,
}

impl<T> ReasonedPrediction<T> {
    pub fn new(prediction_value: T, reasoning: impl Into<String>) -> Self {
        Self {
            prediction_value,
            reasoning: reasoning.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedOption {
    pub option_name: String,
    pub probability: f64,
}

/// Per-option probabilities in the question's option order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedOptionList {
    pub predicted_options: Vec<PredictedOption>,
}

impl PredictedOptionList {
    pub fn probability_of(&self, option: &str) -> Option<f64> {
        self.predicted_options
            .iter()
            .find(|o| o.option_name == option)
            .map(|o| o.probability)
    }

    pub fn total(&self) -> f64 {
        self.predicted_options.iter().map(|o| o.probability).sum()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.predicted_options
            .iter()
            .map(|o| o.option_name.as_str())
            .collect()
    }
}

/// One declared point on the percentile curve; `percentile` is a rank in 1..=99
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Percentile {
    pub percentile: u8,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericDistribution {
    /// Sorted by percentile, values non-decreasing
    pub declared_percentiles: Vec<Percentile>,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub open_lower_bound: bool,
    pub open_upper_bound: bool,
    pub unit_of_measure: Option<String>,
}

impl NumericDistribution {
    pub fn value_at(&self, percentile: u8) -> Option<f64> {
        self.declared_percentiles
            .iter()
            .find(|p| p.percentile == percentile)
            .map(|p| p.value)
    }

    /// Declared median, or the midpoint of the two points around rank 50
    pub fn median(&self) -> Option<f64> {
        if let Some(v) = self.value_at(50) {
            return Some(v);
        }
        let below = self
            .declared_percentiles
            .iter()
            .rev()
            .find(|p| p.percentile < 50)?;
        let above = self.declared_percentiles.iter().find(|p| p.percentile > 50)?;
        Some((below.value + above.value) / 2.0)
    }

    /// Cumulative probabilities on an evenly spaced grid over the question range.
    ///
    /// Closed sides pin the ends to 0 and 1; open sides keep at least 0.1% of
    /// mass outside the range and otherwise follow the declared curve, however
    /// much of it lies beyond the bound. The result is strictly increasing.
    pub fn cdf(&self, points: usize) -> Vec<f64> {
        let points = points.max(2);
        let mut anchors: Vec<(f64, f64)> = self
            .declared_percentiles
            .iter()
            .map(|p| (p.value, f64::from(p.percentile) / 100.0))
            .collect();

        let first_p = anchors.first().map(|a| a.1).unwrap_or(0.5);
        let last_p = anchors.last().map(|a| a.1).unwrap_or(0.5);
        if anchors.first().is_none_or(|a| a.0 > self.lower_bound) {
            let edge = if self.open_lower_bound {
                OPEN_TAIL_MASS.min(first_p)
            } else {
                0.0
            };
            anchors.insert(0, (self.lower_bound, edge));
        }
        if anchors.last().is_none_or(|a| a.0 < self.upper_bound) {
            let edge = if self.open_upper_bound {
                (1.0 - OPEN_TAIL_MASS).max(last_p)
            } else {
                1.0
            };
            anchors.push((self.upper_bound, edge));
        }

        let span = self.upper_bound - self.lower_bound;
        let mut cdf: Vec<f64> = (0..points)
            .map(|k| {
                let x = self.lower_bound + span * k as f64 / (points - 1) as f64;
                interpolate(&anchors, x)
            })
            .collect();

        let mut lo = if self.open_lower_bound {
            cdf[0].clamp(OPEN_TAIL_MASS, 1.0 - OPEN_TAIL_MASS)
        } else {
            0.0
        };
        let mut hi = if self.open_upper_bound {
            cdf[points - 1].clamp(OPEN_TAIL_MASS, 1.0 - OPEN_TAIL_MASS)
        } else {
            1.0
        };
        // Mass piled beyond an open side still needs some spread inside the range
        if hi - lo < MIN_IN_RANGE_MASS {
            if self.open_upper_bound {
                hi = (lo + MIN_IN_RANGE_MASS).min(1.0 - OPEN_TAIL_MASS);
            }
            if self.open_lower_bound {
                lo = (hi - MIN_IN_RANGE_MASS).max(OPEN_TAIL_MASS);
            }
        }
        for v in cdf.iter_mut() {
            *v = v.clamp(lo, hi);
        }
        cdf[0] = lo;
        cdf[points - 1] = hi;

        // Blend with a straight ramp so flat stretches still increase
        for (k, v) in cdf.iter_mut().enumerate() {
            let ramp = lo + (hi - lo) * k as f64 / (points - 1) as f64;
            *v = (1.0 - RAMP_WEIGHT) * *v + RAMP_WEIGHT * ramp;
        }
        cdf[0] = lo;
        cdf[points - 1] = hi;
        cdf
    }
}

const OPEN_TAIL_MASS: f64 = 0.001;
const RAMP_WEIGHT: f64 = 0.011;
const MIN_IN_RANGE_MASS: f64 = 0.01;

fn interpolate(anchors: &[(f64, f64)], x: f64) -> f64 {
    let (first, last) = match (anchors.first(), anchors.last()) {
        (Some(f), Some(l)) => (*f, *l),
        _ => return 0.5,
    };
    if x <= first.0 {
        return first.1;
    }
    if x >= last.0 {
        return last.1;
    }
    for pair in anchors.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if b.0 > a.0 && a.0 <= x && x <= b.0 {
            return a.1 + (b.1 - a.1) * (x - a.0) / (b.0 - a.0);
        }
    }
    last.1
}

/// Prediction for one question, shaped by its variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Forecast {
    Binary(ReasonedPrediction<f64>),
    MultipleChoice(ReasonedPrediction<PredictedOptionList>),
    Numeric(ReasonedPrediction<NumericDistribution>),
}

impl Forecast {
    pub fn reasoning(&self) -> &str {
        match self {
            Forecast::Binary(p) => &p.reasoning,
            Forecast::MultipleChoice(p) => &p.reasoning,
            Forecast::Numeric(p) => &p.reasoning,
        }
    }

    /// One-line rendering of the structured value for logs and comments
    pub fn summary(&self) -> String {
        match self {
            Forecast::Binary(p) => format!("{:.1}%", p.prediction_value * 100.0),
            Forecast::MultipleChoice(p) => p
                .prediction_value
                .predicted_options
                .iter()
                .map(|o| format!("{}: {:.1}%", o.option_name, o.probability * 100.0))
                .collect::<Vec<_>>()
                .join(", "),
            Forecast::Numeric(p) => p
                .prediction_value
                .declared_percentiles
                .iter()
                .map(|d| format!("P{}: {}", d.percentile, d.value))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// What gets handed to the platform for one question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastReport {
    pub question_id: Option<u64>,
    #[serde(default)]
    pub post_id: Option<u64>,
    pub page_url: String,
    pub model: String,
    pub research: String,
    pub forecast: Forecast,
}
