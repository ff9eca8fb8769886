//! Forecast one or more questions and print the reports as JSON.
//!
//! Usage:
//!   forecast --question 31268
//!   forecast --question https://www.metaculus.com/questions/31268/ --publish
//!   forecast --question-file questions.json

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use forecast_mind::clients::ChatCompletionsClient;
use forecast_mind::config::Config;
use forecast_mind::forecaster::Forecaster;
use forecast_mind::platform::{MetaculusClient, Platform};
use forecast_mind::question::Question;
use serde_json::{Value, json};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "forecast")]
#[command(about = "Research, forecast and optionally publish forecasting questions", long_about = None)]
struct Cli {
    /// Question id or page URL (repeatable)
    #[arg(long = "question", value_name = "ID_OR_URL")]
    questions: Vec<String>,
    /// JSON file holding an array of questions
    #[arg(long, value_name = "JSON")]
    question_file: Option<PathBuf>,
    /// Submit successful forecasts to the platform
    #[arg(long)]
    publish: bool,
}

fn load_question_file(path: &PathBuf) -> Result<Vec<Question>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read question file {}", path.display()))?;
    let questions: Vec<Question> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse question file {}", path.display()))?;
    for q in &questions {
        q.validate()
            .with_context(|| format!("Invalid question {}", q.page_url()))?;
    }
    Ok(questions)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    let log_level = if config.runtime.log_level.is_empty() {
        "forecast_mind=info,forecast=info"
    } else {
        config.runtime.log_level.as_str()
    };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    if cli.questions.is_empty() && cli.question_file.is_none() {
        anyhow::bail!("nothing to forecast: pass --question or --question-file");
    }

    let platform = MetaculusClient::from_config(&config);
    let mut inputs: Vec<String> = Vec::new();
    let mut questions: Vec<Question> = Vec::new();
    let mut failures: Vec<Value> = Vec::new();

    if let Some(path) = &cli.question_file {
        for q in load_question_file(path)? {
            inputs.push(q.page_url().to_string());
            questions.push(q);
        }
    }
    for id_or_url in &cli.questions {
        match platform.get_question(id_or_url).await {
            Ok(q) => {
                inputs.push(id_or_url.clone());
                questions.push(q);
            }
            Err(e) => {
                error!("Failed to fetch {}: {}", id_or_url, e);
                failures.push(json!({"input": id_or_url, "error": e.to_string()}));
            }
        }
    }

    let model = ChatCompletionsClient::from_config(&config.llm, config.runtime.llm_api_key.clone());
    let forecaster = Forecaster::from_config(&config, Arc::new(model));
    info!(
        "Forecasting {} questions with {} (at most {} at a time)",
        questions.len(),
        forecaster.model_name(),
        config.forecast.max_concurrent_questions
    );

    let results = forecaster.report_all(&questions).await;
    let mut output: Vec<Value> = Vec::with_capacity(results.len() + failures.len());
    for (input, result) in inputs.iter().zip(results) {
        match result {
            Ok(report) => {
                if cli.publish
                    && let Err(e) = platform.submit_report(&report).await
                {
                    warn!("Failed to publish {}: {}", report.page_url, e);
                    failures.push(json!({"input": input, "error": e.to_string()}));
                }
                output.push(json!({"input": input, "report": report}));
            }
            Err(e) => {
                failures.push(json!({"input": input, "error": e.to_string()}));
            }
        }
    }

    let failed = failures.len();
    output.extend(failures);
    println!("{}", serde_json::to_string_pretty(&output)?);

    if failed > 0 {
        anyhow::bail!("{} question(s) failed", failed);
    }
    Ok(())
}
