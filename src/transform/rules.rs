//! Field rules shared by the dataset transforms

use chrono::{Datelike, NaiveDate};

use super::Check;

/// Date formats accepted for patient and ICD reference dates
pub const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d",
    "%m/%d/%Y", "%m.%d.%Y", "%m-%d-%Y",
    "%d-%m-%Y", "%d/%m/%Y", "%d.%m.%Y",
];

/// Visit dates try day-first dashes before month-first dashes
pub const VISIT_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d",
    "%m/%d/%Y", "%d-%m-%Y", "%d/%m/%Y",
    "%d.%m.%Y", "%m-%d-%Y",
];

pub const LAB_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

const NULL_TOKENS: &[&str] = &["", "nan", "none", "null"];

/// Missing, blank, or one of the usual null spellings
pub fn is_null_like(value: Option<&str>) -> bool {
    match value {
        None => true,
        Some(v) => {
            let v = v.trim().to_lowercase();
            NULL_TOKENS.contains(&v.as_str())
        }
    }
}

/// Null-like, or the literal placeholder `invalid`
pub fn is_invalid_value(value: Option<&str>) -> bool {
    is_null_like(value) || value.is_some_and(|v| v.trim().eq_ignore_ascii_case("invalid"))
}

/// Parse `value` with the first matching format and render it as `YYYY-MM-DD`
pub fn parse_date(value: &str, formats: &[&str]) -> Option<String> {
    let value = value.trim();
    formats
        .iter()
        .filter_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        // four-digit years only, as the extracts never carry anything else
        .find(|date| date.year() >= 1000)
        .map(|date| date.format("%Y-%m-%d").to_string())
}

/// Rule for a date column
pub fn date_rule(formats: &'static [&'static str]) -> impl FnMut(Option<&str>) -> Check {
    move |value| {
        if is_null_like(value) {
            return Check::Blank;
        }
        match value.and_then(|v| parse_date(v, formats)) {
            Some(date) if Some(date.as_str()) == value => Check::Keep,
            Some(date) => Check::Set(date),
            None => Check::Clear("unrecognized date format"),
        }
    }
}

/// Rule for a free-text column that only has to be present
pub fn required(value: Option<&str>) -> Check {
    if is_null_like(value) {
        Check::Clear("missing value")
    } else {
        Check::Keep
    }
}

/// Render a number with exactly two decimals
pub fn two_decimals(value: f64) -> String {
    format!("{:.2}", value)
}

/// Round to two decimals and render the shortest form that keeps a
/// decimal point (`12.5`, `12.0`, `3.14`)
pub fn rounded(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded.fract() == 0.0 {
        format!("{:.1}", rounded)
    } else {
        format!("{}", rounded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_invalid_value() {
        assert!(is_invalid_value(None));
        assert!(is_invalid_value(Some("")));
        assert!(is_invalid_value(Some("nan")));
        assert!(is_invalid_value(Some("none")));
        assert!(is_invalid_value(Some("null")));
        assert!(is_invalid_value(Some("  ")));
        assert!(is_invalid_value(Some("INVALID")));
        assert!(!is_invalid_value(Some("valid")));
        assert!(!is_invalid_value(Some("0")));
        assert!(!is_invalid_value(Some("false")));
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("2024-01-01", DATE_FORMATS).as_deref(), Some("2024-01-01"));
        assert_eq!(parse_date("2024/1/5", DATE_FORMATS).as_deref(), Some("2024-01-05"));
        assert_eq!(parse_date("01/15/2024", DATE_FORMATS).as_deref(), Some("2024-01-15"));
        assert_eq!(parse_date("15.01.2024", DATE_FORMATS).as_deref(), Some("2024-01-15"));
        assert_eq!(parse_date("invalid", DATE_FORMATS), None);
        assert_eq!(parse_date("02/30/2024", DATE_FORMATS), None);
    }

    #[test]
    fn test_ambiguous_dashes_follow_format_order() {
        assert_eq!(parse_date("02-03-2024", DATE_FORMATS).as_deref(), Some("2024-02-03"));
        assert_eq!(parse_date("02-03-2024", VISIT_DATE_FORMATS).as_deref(), Some("2024-03-02"));
    }

    #[test]
    fn test_lab_formats_are_narrower() {
        assert_eq!(parse_date("15.01.2024", LAB_DATE_FORMATS), None);
        assert_eq!(parse_date("01/16/2024", LAB_DATE_FORMATS).as_deref(), Some("2024-01-16"));
    }

    #[test]
    fn test_number_rendering() {
        assert_eq!(two_decimals(150.0), "150.00");
        assert_eq!(two_decimals(99.999), "100.00");
        assert_eq!(rounded(12.5), "12.5");
        assert_eq!(rounded(12.0), "12.0");
        assert_eq!(rounded(3.14159), "3.14");
    }
}
