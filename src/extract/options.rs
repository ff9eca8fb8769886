use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use super::strip_markup;
use crate::error::{ForecastError, Result};
use crate::prediction::{PredictedOption, PredictedOptionList};

/// Bullet and numbered-list markers ahead of an option line
static LIST_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:[-*•]\s+)?(?P<marker>\d+[.)]\s+)?(?P<body>.+?)\s*$")
        .expect("option list line regex should compile")
});

/// What follows a label's colon: `NN`, `NN%`, optionally annotated
static OPTION_VALUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?P<value>\d+(?:\.\d+)?)(?:\s*%.*|\s+\D.*|\s*)$")
        .expect("option value regex should compile")
});

/// Raw totals further than this from 100% get a warning
const TOTAL_DRIFT_WARN: f64 = 0.01;

/// What to do when a canonical option never appears in the model text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingOptionPolicy {
    /// Fail the attempt
    #[default]
    Fail,
    /// Give the option the floor probability and log a warning
    AssignFloor,
}

impl std::str::FromStr for MissingOptionPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail" => Ok(MissingOptionPolicy::Fail),
            "assign_floor" | "floor" => Ok(MissingOptionPolicy::AssignFloor),
            other => Err(format!("unknown missing-option policy '{}'", other)),
        }
    }
}

/// Case-, width- and whitespace-insensitive label key
pub fn normalize_label(label: &str) -> String {
    let nfkc: String = label.nfkc().collect();
    nfkc.trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '*')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Every way to split `label: value` at a colon followed by a value,
/// leftmost first. Labels may contain colons; values may carry trailing notes.
fn split_candidates(body: &str) -> Vec<(&str, f64)> {
    body.match_indices(':')
        .filter_map(|(idx, _)| {
            let label = body[..idx].trim();
            if label.is_empty() {
                return None;
            }
            let caps = OPTION_VALUE_RE.captures(&body[idx + 1..])?;
            let value = caps["value"].parse::<f64>().ok()?;
            Some((label, value))
        })
        .collect()
}

/// Every `label: value` line in document order; later duplicates override.
/// A split whose label names a wanted option wins over the leftmost split.
/// Numbered lines are keyed both with and without their list marker.
fn scan_option_lines(text: &str, wanted: &HashSet<String>) -> HashMap<String, (String, f64)> {
    let mut found = HashMap::new();
    for line in text.lines() {
        let cleaned = strip_markup(line);
        let Some(caps) = LIST_LINE_RE.captures(&cleaned) else {
            continue;
        };
        let marker = caps.name("marker").map(|m| m.as_str()).unwrap_or("");
        let candidates = split_candidates(&caps["body"]);
        let picked = candidates
            .iter()
            .find(|(label, _)| {
                wanted.contains(&normalize_label(label))
                    || wanted.contains(&normalize_label(&format!("{}{}", marker, label)))
            })
            .or_else(|| candidates.first());
        let Some((label, value)) = picked else {
            continue;
        };
        let key = normalize_label(label);
        if key.is_empty() {
            continue;
        }
        found.insert(key, (label.to_string(), value / 100.0));
        if !marker.is_empty() {
            let full = format!("{}{}", marker, label);
            found.insert(normalize_label(&full), (full, value / 100.0));
        }
    }
    found
}

fn closest_label<'a>(wanted: &str, found: &'a HashMap<String, (String, f64)>) -> Option<(&'a str, f64)> {
    found
        .iter()
        .map(|(key, (label, _))| (label.as_str(), strsim::normalized_levenshtein(wanted, key)))
        .max_by(|a, b| a.1.total_cmp(&b.1))
}

/// Raise every entry to at least `floor`, taking the mass proportionally
/// from entries above it. Returns true when anything was raised.
pub fn apply_floor(probs: &mut [f64], floor: f64) -> bool {
    let n = probs.len();
    if n == 0 || floor <= 0.0 {
        return false;
    }
    if floor * n as f64 >= 1.0 {
        let uniform = 1.0 / n as f64;
        let changed = probs.iter().any(|p| (p - uniform).abs() > f64::EPSILON);
        probs.iter_mut().for_each(|p| *p = uniform);
        return changed;
    }

    let mut pinned = vec![false; n];
    let mut raised = false;
    loop {
        let mut changed = false;
        for (i, p) in probs.iter().enumerate() {
            if !pinned[i] && *p < floor {
                pinned[i] = true;
                changed = true;
            }
        }
        if !changed {
            break;
        }
        raised = true;

        let pinned_count = pinned.iter().filter(|p| **p).count();
        let free_mass = 1.0 - pinned_count as f64 * floor;
        let free_sum: f64 = probs
            .iter()
            .zip(&pinned)
            .filter(|(_, pin)| !**pin)
            .map(|(p, _)| *p)
            .sum();
        for (p, pin) in probs.iter_mut().zip(&pinned) {
            *p = if *pin { floor } else { *p * free_mass / free_sum };
        }
    }
    raised
}

/// Per-option probabilities in the order of `options`, summing to 1.
pub fn extract_option_list(
    text: &str,
    options: &[String],
    floor: f64,
    policy: MissingOptionPolicy,
) -> Result<PredictedOptionList> {
    if options.is_empty() {
        return Err(ForecastError::extraction("question has no options to match"));
    }

    let wanted: HashSet<String> = options.iter().map(|o| normalize_label(o)).collect();
    let found = scan_option_lines(text, &wanted);
    if found.is_empty() {
        return Err(ForecastError::extraction(
            "no 'option: probability' lines found in model response",
        ));
    }

    let mut raw: Vec<Option<f64>> = Vec::with_capacity(options.len());
    let mut missing: Vec<&str> = Vec::new();
    for option in options {
        let key = normalize_label(option);
        match found.get(&key) {
            Some((_, value)) => raw.push(Some(*value)),
            None => {
                let hint = closest_label(&key, &found)
                    .map(|(label, score)| format!(" (closest: '{}', similarity {:.2})", label, score))
                    .unwrap_or_default();
                match policy {
                    MissingOptionPolicy::Fail => {
                        return Err(ForecastError::extraction(format!(
                            "option '{}' missing from model response{}",
                            option, hint
                        )));
                    }
                    MissingOptionPolicy::AssignFloor => {
                        tracing::warn!(
                            "option '{}' missing from model response{}, assigning floor {}",
                            option,
                            hint,
                            floor
                        );
                        missing.push(option);
                        raw.push(None);
                    }
                }
            }
        }
    }

    let matched_total: f64 = raw.iter().flatten().sum();
    if matched_total <= 0.0 {
        return Err(ForecastError::extraction(
            "matched option probabilities sum to zero",
        ));
    }
    if missing.is_empty() && (matched_total - 1.0).abs() > TOTAL_DRIFT_WARN {
        tracing::warn!(
            "option probabilities summed to {:.1}%, rescaling to 100%",
            matched_total * 100.0
        );
    }

    // Missing options hold the floor; matched ones share the rest
    let missing_mass = (missing.len() as f64 * floor).min(1.0);
    let scale = (1.0 - missing_mass) / matched_total;
    let mut probs: Vec<f64> = raw
        .iter()
        .map(|r| match r {
            Some(v) => v * scale,
            None => floor,
        })
        .collect();

    if apply_floor(&mut probs, floor) {
        tracing::warn!("option floor {} applied to near-zero options", floor);
    }

    Ok(PredictedOptionList {
        predicted_options: options
            .iter()
            .zip(probs)
            .map(|(option, probability)| PredictedOption {
                option_name: option.clone(),
                probability,
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb() -> Vec<String> {
        vec!["Red".into(), "Green".into(), "Blue".into()]
    }

    fn assert_sums_to_one(list: &PredictedOptionList) {
        assert!((list.total() - 1.0).abs() < 1e-6, "total {}", list.total());
    }

    #[test]
    fn output_follows_question_order() {
        let text = "Reasoning...\nBlue: 50%\nRed: 20%\nGreen: 30%";
        let list = extract_option_list(text, &rgb(), 0.001, MissingOptionPolicy::Fail).unwrap();
        assert_eq!(list.labels(), vec!["Red", "Green", "Blue"]);
        let probs: Vec<f64> = list.predicted_options.iter().map(|o| o.probability).collect();
        for (got, want) in probs.iter().zip([0.2, 0.3, 0.5]) {
            assert!((got - want).abs() < 1e-9, "{} vs {}", got, want);
        }
        assert_sums_to_one(&list);
    }

    #[test]
    fn rescales_when_total_is_off() {
        let text = "Red: 30%\nGreen: 30%\nBlue: 60%";
        let list = extract_option_list(text, &rgb(), 0.001, MissingOptionPolicy::Fail).unwrap();
        assert_sums_to_one(&list);
        assert!((list.probability_of("Blue").unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn zero_option_raised_to_floor() {
        let text = "Red: 0%\nGreen: 40%\nBlue: 60%";
        let list = extract_option_list(text, &rgb(), 0.001, MissingOptionPolicy::Fail).unwrap();
        assert_sums_to_one(&list);
        assert!(list.predicted_options.iter().all(|o| o.probability >= 0.001 - 1e-12));
        assert!((list.probability_of("Red").unwrap() - 0.001).abs() < 1e-12);
    }

    #[test]
    fn later_lines_override_working() {
        let text = "Draft:\nRed: 10%\nGreen: 10%\nBlue: 80%\n\nFinal:\n- **Red**: 25%\n- **Green**: 25%\n- **Blue**: 50%";
        let list = extract_option_list(text, &rgb(), 0.001, MissingOptionPolicy::Fail).unwrap();
        assert!((list.probability_of("Red").unwrap() - 0.25).abs() < 1e-9);
        assert!((list.probability_of("Blue").unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn labels_match_case_and_whitespace_insensitively() {
        let text = "  red :  20%\nGREEN: 30 %\nblue:50";
        let list = extract_option_list(text, &rgb(), 0.001, MissingOptionPolicy::Fail).unwrap();
        assert!((list.probability_of("Green").unwrap() - 0.3).abs() < 1e-9);
        assert_sums_to_one(&list);
    }

    #[test]
    fn labels_with_colons_split_on_last_colon() {
        let options = vec!["Score: 0-1".to_string(), "Score: 2+".to_string()];
        let text = "Score: 0-1: 70%\nScore: 2+: 30%";
        let list = extract_option_list(text, &options, 0.001, MissingOptionPolicy::Fail).unwrap();
        assert!((list.probability_of("Score: 0-1").unwrap() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn missing_option_fails_under_strict_policy() {
        let text = "Red: 40%\nGreen: 60%";
        let err = extract_option_list(text, &rgb(), 0.001, MissingOptionPolicy::Fail).unwrap_err();
        assert!(err.is_extraction());
        assert!(err.to_string().contains("Blue"));
    }

    #[test]
    fn missing_option_gets_floor_under_lenient_policy() {
        let text = "Red: 40%\nGreen: 60%";
        let list =
            extract_option_list(text, &rgb(), 0.001, MissingOptionPolicy::AssignFloor).unwrap();
        assert_eq!(list.labels(), vec!["Red", "Green", "Blue"]);
        assert!((list.probability_of("Blue").unwrap() - 0.001).abs() < 1e-12);
        assert_sums_to_one(&list);
    }

    #[test]
    fn no_lines_is_fatal() {
        let err = extract_option_list("I cannot decide.", &rgb(), 0.001, MissingOptionPolicy::AssignFloor)
            .unwrap_err();
        assert!(err.is_extraction());
    }

    #[test]
    fn all_zero_is_fatal() {
        let text = "Red: 0%\nGreen: 0%\nBlue: 0%";
        assert!(extract_option_list(text, &rgb(), 0.001, MissingOptionPolicy::Fail).is_err());
    }

    #[test]
    fn annotated_final_lines_override_bare_draft() {
        let text = "Draft:\nRed: 10%\nGreen: 10%\nBlue: 80%\n\nFinal:\n\
                    Red: 25% (up from draft)\nGreen: 25% (unchanged)\nBlue: 50% <- final";
        let list = extract_option_list(text, &rgb(), 0.001, MissingOptionPolicy::Fail).unwrap();
        assert!((list.probability_of("Red").unwrap() - 0.25).abs() < 1e-9);
        assert!((list.probability_of("Green").unwrap() - 0.25).abs() < 1e-9);
        assert!((list.probability_of("Blue").unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn annotations_with_colons_keep_first_value() {
        let text = "Red: 20% (was: 10%)\nGreen: 30 (steady)\nBlue: 50%";
        let list = extract_option_list(text, &rgb(), 0.001, MissingOptionPolicy::Fail).unwrap();
        assert!((list.probability_of("Red").unwrap() - 0.2).abs() < 1e-9);
        assert!((list.probability_of("Green").unwrap() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn template_echo_is_not_a_value() {
        let text = "Red: Probability_Red\nRed: 20%\nGreen: 30%\nBlue: 50%\nBlue: Probability_Blue";
        let list = extract_option_list(text, &rgb(), 0.001, MissingOptionPolicy::Fail).unwrap();
        assert!((list.probability_of("Blue").unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn colon_labels_survive_annotated_values() {
        let options = vec!["Score: 0-1".to_string(), "Score: 2+".to_string()];
        let text = "Score: 0-1: 70% (was: 60%)\nScore: 2+: 30%";
        let list = extract_option_list(text, &options, 0.001, MissingOptionPolicy::Fail).unwrap();
        assert!((list.probability_of("Score: 0-1").unwrap() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn numbered_labels_match_with_or_without_marker() {
        let clubs = vec!["1. FC Köln".to_string(), "2. Hertha".to_string()];
        let text = "1. FC Köln: 60%\n2. Hertha: 40%";
        let list = extract_option_list(text, &clubs, 0.001, MissingOptionPolicy::Fail).unwrap();
        assert!((list.probability_of("1. FC Köln").unwrap() - 0.6).abs() < 1e-9);

        let numbered = "1. Red: 20%\n2. Green: 30%\n3. Blue: 50%";
        let list = extract_option_list(numbered, &rgb(), 0.001, MissingOptionPolicy::Fail).unwrap();
        assert!((list.probability_of("Green").unwrap() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn floor_cascades_until_stable() {
        let mut probs = vec![0.0, 0.0005, 0.9995];
        assert!(apply_floor(&mut probs, 0.001));
        assert!(probs.iter().all(|p| *p >= 0.001 - 1e-12));
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }
}
