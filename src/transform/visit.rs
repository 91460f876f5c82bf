//! Visit rules
//!
//! Two repairs run before validation: an ICD code appended to the reason
//! text is moved into `icd_code`, and a currency code sitting in
//! `billable_amount` is moved into an empty `currency`.

use std::sync::LazyLock;

use regex::Regex;

use super::rules::{self, VISIT_DATE_FORMATS, is_null_like};
use super::{Check, Frame};
use crate::Result;

static VISIT_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^V[0-9]+$").unwrap());
static PROVIDER_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^PR[0-9]+$").unwrap());
static ICD_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][0-9]{2}(\.[0-9A-Z]{1,4})?$").unwrap());
static CURRENCY_LIKE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z]{3}$").unwrap());

const CURRENCIES: &[&str] = &["USD", "MXN", "JPY", "CAD", "EUR"];
const VISIT_STATUSES: &[&str] = &["Completed", "Cancelled", "In Progress", "Scheduled", "Open"];

/// Split `"Fever, A12.3"` into the reason and a valid ICD fragment.
pub fn split_reason_and_icd(frame: &mut Frame) -> Result<usize> {
    let mut moved = 0;
    for row in 0..frame.len() {
        let raw = frame.get(row, "reason_for_visit").unwrap_or("").to_string();
        let mut parts = raw.split(',').map(str::trim);
        let reason = parts.next().unwrap_or("");
        let candidate = parts.next().unwrap_or("");

        let reason = if is_null_like(Some(reason)) { None } else { Some(reason.to_string()) };
        frame.set(row, "reason_for_visit", reason)?;

        if ICD_CODE.is_match(candidate) {
            frame.set(row, "icd_code", Some(candidate.to_string()))?;
            tracing::info!("{}: moved ICD code '{}' to icd_code from row {}", frame.name(), candidate, row);
            moved += 1;
        } else if !candidate.is_empty() {
            tracing::warn!("{}: invalid ICD code fragment in reason at row {}: '{}'", frame.name(), row, candidate);
        }
    }
    Ok(moved)
}

/// Move a currency code misplaced in `billable_amount` into an empty
/// `currency` cell.
pub fn swap_misplaced_currency(frame: &mut Frame) -> Result<usize> {
    let mut swapped = 0;
    for row in 0..frame.len() {
        let bill = frame.get(row, "billable_amount").map(str::trim).unwrap_or("").to_string();
        let currency = frame.get(row, "currency");

        if CURRENCY_LIKE.is_match(&bill) && is_null_like(currency) {
            frame.set(row, "currency", Some(bill.clone()))?;
            frame.set(row, "billable_amount", None)?;
            tracing::warn!(
                "{}: moved '{}' from billable_amount to currency at row {}",
                frame.name(),
                bill,
                row
            );
            swapped += 1;
        }
    }
    Ok(swapped)
}

pub fn visit_id(value: Option<&str>) -> Check {
    match value {
        Some(v) if VISIT_ID.is_match(v.trim()) => Check::Keep,
        _ => Check::Clear("must start with 'V' followed by digits"),
    }
}

pub fn provider_id(value: Option<&str>) -> Check {
    match value {
        v if is_null_like(v) => Check::Blank,
        Some(v) if PROVIDER_ID.is_match(v.trim()) => Check::Keep,
        _ => Check::Clear("must start with 'PR' followed by digits"),
    }
}

pub fn location(value: Option<&str>) -> Check {
    match value {
        Some(v) if !is_null_like(value) && !v.trim().eq_ignore_ascii_case("unknown") => Check::Keep,
        _ => Check::Clear("missing or unknown location"),
    }
}

pub fn icd_code(value: Option<&str>) -> Check {
    match value {
        v if is_null_like(v) => Check::Blank,
        Some(v) if ICD_CODE.is_match(v.trim()) => Check::Keep,
        _ => Check::Clear("not a valid ICD code"),
    }
}

pub fn visit_status(value: Option<&str>) -> Check {
    match value.map(str::trim) {
        Some(v) if VISIT_STATUSES.contains(&v) => Check::Keep,
        _ => Check::Clear("not a known visit status"),
    }
}

/// Numeric amounts are rendered with two decimals
pub fn billable_amount(value: Option<&str>) -> Check {
    match value {
        v if is_null_like(v) => Check::Blank,
        Some(v) => match v.trim().parse::<f64>() {
            Ok(amount) if amount.is_finite() => Check::Set(rules::two_decimals(amount)),
            _ => Check::Clear("not a number"),
        },
        None => Check::Blank,
    }
}

pub fn currency(value: Option<&str>) -> Check {
    match value.map(str::trim) {
        Some(v) if CURRENCIES.contains(&v) => Check::Keep,
        _ => Check::Clear("must be a supported 3-letter currency code"),
    }
}

pub fn clean(frame: &mut Frame) -> Result<usize> {
    split_reason_and_icd(frame)?;
    swap_misplaced_currency(frame)?;

    let mut cleared = 0;
    cleared += frame.check_column("visit_id", visit_id)?;
    cleared += frame.check_column("provider_id", provider_id)?;
    cleared += frame.check_column("visit_date", rules::date_rule(VISIT_DATE_FORMATS))?;
    cleared += frame.check_column("location", location)?;
    cleared += frame.check_column("reason_for_visit", rules::required)?;
    cleared += frame.check_column("icd_code", icd_code)?;
    cleared += frame.check_column("visit_status", visit_status)?;
    cleared += frame.check_column("billable_amount", billable_amount)?;
    cleared += frame.check_column("currency", currency)?;
    cleared += frame.check_column("follow_up_date", rules::date_rule(VISIT_DATE_FORMATS))?;
    tracing::info!("{}: data validation complete", frame.name());
    Ok(cleared)
}
