//! Lab result rules

use std::sync::LazyLock;

use regex::Regex;

use super::rules::{self, LAB_DATE_FORMATS, is_null_like};
use super::{Check, Frame};
use crate::Result;

static LAB_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^L[0-9]{4}$").unwrap());
static VISIT_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^V[0-9]+$").unwrap());
static RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+(\.[0-9]+)?\s*-\s*[0-9]+(\.[0-9]+)?$").unwrap());

const TEXT_RESULTS: &[&str] = &["positive", "negative", "pending"];
const TEXT_RANGES: &[&str] = &["negative", "positive", "pending", "none", "nan", ""];

fn numeric(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn lab_id(value: Option<&str>) -> Check {
    match value {
        Some(v) if LAB_ID.is_match(v) => Check::Keep,
        _ => Check::Clear("must be 'L' followed by four digits"),
    }
}

pub fn visit_id(value: Option<&str>) -> Check {
    match value {
        v if is_null_like(v) => Check::Clear("missing visit ID"),
        Some(v) if VISIT_ID.is_match(v.trim()) => Check::Keep,
        _ => Check::Clear("must start with 'V' followed by digits"),
    }
}

/// Numbers are rounded to two decimals; `positive`, `negative` and
/// `pending` are capitalized.
pub fn test_value(value: Option<&str>) -> Check {
    let Some(v) = value.filter(|_| !is_null_like(value)) else {
        return Check::Clear("missing test value");
    };
    let lower = v.trim().to_lowercase();
    if TEXT_RESULTS.contains(&lower.as_str()) {
        let mut chars = lower.chars();
        let capitalized: String = chars
            .next()
            .map(|c| c.to_uppercase().chain(chars).collect())
            .unwrap_or_default();
        return if capitalized == v { Check::Keep } else { Check::Set(capitalized) };
    }
    match numeric(v) {
        Some(n) => {
            let formatted = rules::rounded(n);
            if formatted == v { Check::Keep } else { Check::Set(formatted) }
        }
        None => Check::Clear("not numeric or an allowed result"),
    }
}

/// A numeric test value needs a unit. Runs after `test_value`.
pub fn check_units(frame: &mut Frame) -> Result<usize> {
    let mut cleared = 0;
    for row in 0..frame.len() {
        let Some(value) = frame.get(row, "test_value").and_then(numeric) else {
            continue;
        };
        let unit = frame.get(row, "test_units");
        if is_null_like(unit) {
            tracing::warn!("{}: missing test unit at row {} for numeric value '{}'", frame.name(), row, value);
            if unit.is_some() {
                cleared += 1;
            }
            frame.set(row, "test_units", None)?;
        }
    }
    Ok(cleared)
}

pub fn reference_range(value: Option<&str>) -> Check {
    let lower = value.unwrap_or("").trim().to_lowercase();
    if TEXT_RANGES.contains(&lower.as_str()) || RANGE.is_match(&lower) {
        Check::Keep
    } else {
        Check::Clear("expected a range like '11.0-14.0' or 'Negative'")
    }
}

pub fn clean(frame: &mut Frame) -> Result<usize> {
    let mut cleared = 0;
    cleared += frame.check_column("lab_id", lab_id)?;
    cleared += frame.check_column("visit_id", visit_id)?;
    cleared += frame.check_column("test_name", rules::required)?;
    cleared += frame.check_column("test_value", test_value)?;
    cleared += check_units(frame)?;
    cleared += frame.check_column("reference_range", reference_range)?;
    cleared += frame.check_column("date_performed", rules::date_rule(LAB_DATE_FORMATS))?;
    cleared += frame.check_column("date_resulted", rules::date_rule(LAB_DATE_FORMATS))?;
    tracing::info!("{}: data validation complete", frame.name());
    Ok(cleared)
}
