use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};

static PERCENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(-?\d+(?:\.\d+)?)\s*%").expect("percent regex should compile"));

/// Open sub-interval of (0, 1) that binary predictions are clamped into
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "(f64, f64)", into = "(f64, f64)")]
pub struct ProbabilityBand {
    min: f64,
    max: f64,
}

impl ProbabilityBand {
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if !(min > 0.0 && min < max && max < 1.0) {
            return Err(ForecastError::Config {
                message: format!(
                    "probability band must satisfy 0 < min < max < 1, got [{}, {}]",
                    min, max
                ),
            });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

impl Default for ProbabilityBand {
    fn default() -> Self {
        Self {
            min: 0.01,
            max: 0.99,
        }
    }
}

impl TryFrom<(f64, f64)> for ProbabilityBand {
    type Error = ForecastError;

    fn try_from((min, max): (f64, f64)) -> Result<Self> {
        Self::new(min, max)
    }
}

impl From<ProbabilityBand> for (f64, f64) {
    fn from(band: ProbabilityBand) -> Self {
        (band.min, band.max)
    }
}

/// Last "NN%" in the text, as a probability clamped into `band`.
///
/// The prompt asks for the final answer last, so earlier percentages are
/// treated as working.
pub fn extract_last_percentage_value(text: &str, band: ProbabilityBand) -> Result<f64> {
    let raw = PERCENT_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<f64>().ok())
        .last()
        .ok_or_else(|| ForecastError::extraction("no percentage found in model response"))?;

    let probability = raw / 100.0;
    let clamped = band.clamp(probability);
    if clamped != probability {
        tracing::debug!(
            "clamped stated probability {} into [{}, {}]",
            probability,
            band.min(),
            band.max()
        );
    }
    Ok(clamped)
}
