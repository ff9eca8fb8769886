pub mod clients;
pub mod config;
pub mod error;
pub mod extract;
pub mod forecaster;
pub mod platform;
pub mod prediction;
pub mod prompts;
pub mod question;
pub mod research;

pub use error::{ForecastError, Result};
pub use forecaster::Forecaster;
pub use prediction::{
    Forecast, ForecastReport, NumericDistribution, Percentile, PredictedOption,
    PredictedOptionList, ReasonedPrediction,
};
pub use question::{
    BinaryQuestion, MultipleChoiceQuestion, NumericQuestion, Question, QuestionDetails,
};
