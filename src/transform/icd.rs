//! ICD reference rules

use std::sync::LazyLock;

use regex::Regex;

use super::rules::{self, DATE_FORMATS};
use super::{Check, Frame};
use crate::Result;

static ICD_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z][0-9]{2}(\.[0-9]+)?$").unwrap());

pub fn icd_code(value: Option<&str>) -> Check {
    match value {
        Some(v) if ICD_CODE.is_match(v.trim()) => Check::Keep,
        _ => Check::Clear("not a letter followed by two digits"),
    }
}

pub fn status(value: Option<&str>) -> Check {
    let normalized = value.map(|v| v.trim().to_lowercase());
    match normalized.as_deref() {
        Some("active") => Check::Set("Active".into()),
        Some("inactive") => Check::Set("Inactive".into()),
        _ => Check::Clear("status must be active or inactive"),
    }
}

pub fn clean(frame: &mut Frame) -> Result<usize> {
    let mut cleared = 0;
    cleared += frame.check_column("icd_code", icd_code)?;
    cleared += frame.check_column("description", rules::required)?;
    cleared += frame.check_column("effective_date", rules::date_rule(DATE_FORMATS))?;
    cleared += frame.check_column("status", status)?;
    tracing::info!("{}: data validation complete", frame.name());
    Ok(cleared)
}
