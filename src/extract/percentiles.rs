use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use super::strip_markup;
use crate::error::{ForecastError, Result};
use crate::prediction::{NumericDistribution, Percentile};
use crate::question::NumericQuestion;

static PERCENTILE_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:[-*•]\s+)?percentile\s*(?P<rank>\d{1,3})\s*:\s*(?P<value>.+?)\s*$")
        .expect("percentile line regex should compile")
});

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<neg>[-−])?\s*[$€£]?\s*(?P<neg2>[-−])?(?P<int>\d{1,3}(?:,\d{3})+|\d+)(?P<frac>\.\d+)?(?P<rest>.*)$",
    )
    .expect("number regex should compile")
});

static SCIENTIFIC_TAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:[eE][+-]?\d|[x×*]\s*10\s*\^)").expect("scientific regex should compile")
});

/// Parse a model-written number: `1,234.5`, `-3`, `$12` and `4.2 hours` are
/// accepted; `1e6`, `1,2` and bare words are not.
pub fn parse_number(raw: &str) -> Option<f64> {
    let caps = NUMBER_RE.captures(raw.trim())?;
    let rest = caps.name("rest").map(|m| m.as_str()).unwrap_or("");
    if SCIENTIFIC_TAIL_RE.is_match(rest) || rest.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    // "1,2" or "1.2.3" is garbled rather than a number with a unit
    let mut tail = rest.chars();
    if let (Some(sep), Some(next)) = (tail.next(), tail.next())
        && (sep == ',' || sep == '.')
        && next.is_ascii_digit()
    {
        return None;
    }

    let digits = caps["int"].replace(',', "");
    let frac = caps.name("frac").map(|m| m.as_str()).unwrap_or("");
    let value: f64 = format!("{}{}", digits, frac).parse().ok()?;
    let negative = caps.name("neg").is_some() ^ caps.name("neg2").is_some();
    Some(if negative { -value } else { value })
}

/// Monotone percentile curve from `Percentile NN: value` lines.
///
/// Later lines override earlier ones for the same rank. Unparseable values
/// are skipped; fewer than `min_points` usable points is an error.
pub fn extract_numeric_distribution(
    text: &str,
    question: &NumericQuestion,
    min_points: usize,
) -> Result<NumericDistribution> {
    let mut declared: BTreeMap<u8, f64> = BTreeMap::new();
    for line in text.lines() {
        let cleaned = strip_markup(line);
        let Some(caps) = PERCENTILE_LINE_RE.captures(&cleaned) else {
            continue;
        };
        let rank = match caps["rank"].parse::<u8>() {
            Ok(r) if (1..=99).contains(&r) => r,
            _ => {
                tracing::debug!("skipping out-of-range percentile rank in '{}'", line.trim());
                continue;
            }
        };
        match parse_number(&caps["value"]) {
            Some(value) => {
                declared.insert(rank, value);
            }
            None => {
                tracing::debug!("skipping malformed percentile value in '{}'", line.trim());
            }
        }
    }

    let min_points = min_points.max(1);
    if declared.len() < min_points {
        return Err(ForecastError::extraction(format!(
            "found {} usable percentile line(s), need at least {}",
            declared.len(),
            min_points
        )));
    }

    let mut points: Vec<Percentile> = declared
        .into_iter()
        .map(|(percentile, value)| Percentile { percentile, value })
        .collect();

    let repaired = repair_monotonic(&mut points);
    if repaired > 0 {
        tracing::warn!(
            "raised {} percentile value(s) to keep the curve non-decreasing",
            repaired
        );
    }
    clip_to_bounds(&mut points, question);

    Ok(NumericDistribution {
        declared_percentiles: points,
        lower_bound: question.lower_bound,
        upper_bound: question.upper_bound,
        open_lower_bound: question.open_lower_bound,
        open_upper_bound: question.open_upper_bound,
        unit_of_measure: question.unit_of_measure.clone(),
    })
}

/// Raise any value below its predecessor; returns how many were raised
fn repair_monotonic(points: &mut [Percentile]) -> usize {
    let mut repaired = 0;
    for i in 1..points.len() {
        if points[i].value < points[i - 1].value {
            points[i].value = points[i - 1].value;
            repaired += 1;
        }
    }
    repaired
}

fn clip_to_bounds(points: &mut [Percentile], question: &NumericQuestion) {
    for p in points.iter_mut() {
        if !question.open_lower_bound && p.value < question.lower_bound {
            p.value = question.lower_bound;
        }
        if !question.open_upper_bound && p.value > question.upper_bound {
            p.value = question.upper_bound;
        }
    }
}
