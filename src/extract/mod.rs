//! Free-text → structured prediction extraction.
//!
//! Model output is treated as untrusted: every extractor either returns a
//! value that satisfies its invariants or an `Extraction` error. Nothing here
//! performs I/O.

pub mod options;
pub mod percentage;
pub mod percentiles;

use serde::{Deserialize, Serialize};

pub use options::{MissingOptionPolicy, extract_option_list};
pub use percentage::{ProbabilityBand, extract_last_percentage_value};
pub use percentiles::{extract_numeric_distribution, parse_number};

pub const DEFAULT_OPTION_FLOOR: f64 = 0.001;
pub const DEFAULT_MIN_PERCENTILE_POINTS: usize = 2;

/// Knobs shared by the three extractors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtractionSettings {
    pub band: ProbabilityBand,
    pub option_floor: f64,
    pub missing_option_policy: MissingOptionPolicy,
    pub min_percentile_points: usize,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            band: ProbabilityBand::default(),
            option_floor: DEFAULT_OPTION_FLOOR,
            missing_option_policy: MissingOptionPolicy::Fail,
            min_percentile_points: DEFAULT_MIN_PERCENTILE_POINTS,
        }
    }
}

/// Drop the markdown emphasis models like to wrap answers in
pub(crate) fn strip_markup(line: &str) -> String {
    line.replace("**", "").replace('`', "")
}
