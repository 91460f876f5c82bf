//! Patient demographics rules

use std::sync::LazyLock;

use regex::Regex;

use super::rules::{self, DATE_FORMATS, is_invalid_value};
use super::{Check, Frame};
use crate::Result;

static PATIENT_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z][0-9]+$").unwrap());
static NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-ZÀ-ÖØ-Ý][a-zA-Zà-öø-ÿĀ-ſ]+$").unwrap());
static CITY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z\s\-]+$").unwrap());
static ZIP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]{5}(-[0-9]{4})?$").unwrap());
static INSURANCE_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z]{3}[0-9]{3}$").unwrap());

const BANNED_NAMES: &[&str] = &["invalid", "dob", "name", "firstname", "lastname"];

const US_STATES: &[&str] = &[
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "FL", "GA",
    "HI", "ID", "IL", "IN", "IA", "KS", "KY", "LA", "ME", "MD",
    "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH", "NJ",
    "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC",
    "SD", "TN", "TX", "UT", "VT", "VA", "WA", "WV", "WI", "WY",
];

/// Shorthand for the common "empty or placeholder" case
fn present(value: Option<&str>) -> Option<&str> {
    if is_invalid_value(value) { None } else { value.map(str::trim) }
}

pub fn patient_id(value: Option<&str>) -> Check {
    match present(value) {
        None => Check::Clear("empty or invalid"),
        Some(v) if PATIENT_ID.is_match(v) => Check::Keep,
        Some(_) => Check::Clear("must be a letter followed by digits"),
    }
}

pub fn name(value: Option<&str>) -> Check {
    match present(value) {
        None => Check::Clear("empty or invalid"),
        Some(v) if BANNED_NAMES.contains(&v.to_lowercase().as_str()) => Check::Clear("placeholder name"),
        Some(v) if NAME.is_match(v) => Check::Keep,
        Some(_) => Check::Clear("must be capitalized letters"),
    }
}

pub fn gender(value: Option<&str>) -> Check {
    match present(value).map(str::to_lowercase).as_deref() {
        None => Check::Clear("empty or invalid"),
        Some("m" | "male") => Check::Set("M".into()),
        Some("f" | "female") => Check::Set("F".into()),
        Some(_) => Check::Clear("not M/F/male/female"),
    }
}

pub fn address(value: Option<&str>) -> Check {
    match present(value) {
        None => Check::Clear("empty or invalid"),
        Some(v) if v.chars().count() >= 5 && v.starts_with(|c: char| c.is_ascii_alphanumeric()) => {
            Check::Keep
        }
        Some(_) => Check::Clear("must be at least 5 characters and start with a letter or number"),
    }
}

pub fn city(value: Option<&str>) -> Check {
    match present(value) {
        None => Check::Clear("empty or invalid"),
        Some(v) if v.eq_ignore_ascii_case("unknown") => Check::Clear("unknown city"),
        Some(v) if CITY.is_match(v) => Check::Keep,
        Some(_) => Check::Clear("must contain only letters, spaces or hyphens"),
    }
}

pub fn state(value: Option<&str>) -> Check {
    match present(value).map(str::to_uppercase) {
        None => Check::Clear("empty or invalid"),
        Some(v) if US_STATES.contains(&v.as_str()) => {
            if value == Some(v.as_str()) {
                Check::Keep
            } else {
                Check::Set(v)
            }
        }
        Some(_) => Check::Clear("not a US state abbreviation"),
    }
}

pub fn zip(value: Option<&str>) -> Check {
    let Some(v) = present(value) else {
        return Check::Clear("empty or invalid");
    };
    // spreadsheet exports turn 12345 into 12345.0
    let v = v.strip_suffix(".0").filter(|s| s.chars().all(|c| c.is_ascii_digit())).unwrap_or(v);

    if v.chars().all(|c| c.is_ascii_digit()) && v.len() < 5 {
        Check::Blank
    } else if ZIP.is_match(v) {
        if value == Some(v) { Check::Keep } else { Check::Set(v.to_string()) }
    } else {
        Check::Clear("must be 5 digits or ZIP+4")
    }
}

/// Reformat any 10-digit number as `(XXX) XXX-XXXX`
pub fn phone(value: Option<&str>) -> Check {
    let Some(v) = present(value) else {
        return Check::Clear("empty or invalid");
    };
    let digits: String = v.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 10 {
        return Check::Clear("could not reformat or invalid length");
    }
    let formatted = format!("({}) {}-{}", &digits[..3], &digits[3..6], &digits[6..]);
    if formatted == v { Check::Keep } else { Check::Set(formatted) }
}

pub fn insurance_id(value: Option<&str>) -> Check {
    match present(value) {
        None => Check::Clear("empty or invalid"),
        Some(v) if INSURANCE_ID.is_match(v) => Check::Keep,
        Some(_) => Check::Clear("must be 3 letters followed by 3 digits"),
    }
}

pub fn clean(frame: &mut Frame) -> Result<usize> {
    let mut cleared = 0;
    cleared += frame.check_column("patient_id", patient_id)?;
    cleared += frame.check_column("first_name", name)?;
    cleared += frame.check_column("last_name", name)?;
    cleared += frame.check_column("date_of_birth", rules::date_rule(DATE_FORMATS))?;
    cleared += frame.check_column("gender", gender)?;
    cleared += frame.check_column("address", address)?;
    cleared += frame.check_column("city", city)?;
    cleared += frame.check_column("state", state)?;
    cleared += frame.check_column("zip", zip)?;
    cleared += frame.check_column("phone", phone)?;
    cleared += frame.check_column("insurance_id", insurance_id)?;
    cleared += frame.check_column("insurance_effective_date", rules::date_rule(DATE_FORMATS))?;
    tracing::info!("{}: data validation complete", frame.name());
    Ok(cleared)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADERS: &[&str] = &[
        "patient_id", "first_name", "last_name", "gender", "address", "city", "state", "zip",
        "phone", "insurance_id", "date_of_birth", "insurance_effective_date",
    ];

    fn sample() -> Frame {
        Frame::from_records(
            "patient_data",
            HEADERS,
            &[
                &["A123", "John", "Smith", "M", "123 Main St", "Boston", "MA", "02108",
                  "(555) 123-4567", "ABC123", "1990-01-01", "2024-01-01"],
                &["B456", "Mary", "Johnson", "F", "456 Oak Ave", "New York", "NY", "10001",
                  "555-123-4567", "XYZ789", "01/15/1995", "01/15/2024"],
                &["123", "invalid", "invalid", "Male", "town", "123 City", "XX", "123",
                  "1234567890", "123ABC", "invalid", "invalid"],
                &["invalid", "test", "test", "X", "none", "unknown", "Massachusetts", "12345-6789",
                  "invalid", "invalid", "", ""],
            ],
        )
    }

    #[test]
    fn test_patient_id() {
        let mut df = sample();
        df.check_column("patient_id", patient_id).unwrap();
        assert_eq!(df.get(0, "patient_id"), Some("A123"));
        assert_eq!(df.get(1, "patient_id"), Some("B456"));
        assert_eq!(df.get(2, "patient_id"), None);
        assert_eq!(df.get(3, "patient_id"), None);
    }

    #[test]
    fn test_names() {
        let mut df = sample();
        df.check_column("first_name", name).unwrap();
        df.check_column("last_name", name).unwrap();
        assert_eq!(df.get(0, "first_name"), Some("John"));
        assert_eq!(df.get(1, "first_name"), Some("Mary"));
        assert_eq!(df.get(2, "first_name"), None);
        assert_eq!(df.get(3, "first_name"), None);
        assert_eq!(df.get(0, "last_name"), Some("Smith"));
        assert_eq!(df.get(1, "last_name"), Some("Johnson"));
        assert_eq!(df.get(2, "last_name"), None);
        assert_eq!(df.get(3, "last_name"), None);
    }

    #[test]
    fn test_accented_and_banned_names() {
        assert_eq!(name(Some("Zoë")), Check::Keep);
        assert_eq!(name(Some("Émile")), Check::Keep);
        assert_eq!(name(Some("Name")), Check::Clear("placeholder name"));
        assert_eq!(name(Some("J")), Check::Clear("must be capitalized letters"));
    }

    #[test]
    fn test_gender() {
        let mut df = sample();
        df.check_column("gender", gender).unwrap();
        assert_eq!(df.get(0, "gender"), Some("M"));
        assert_eq!(df.get(1, "gender"), Some("F"));
        assert_eq!(df.get(2, "gender"), Some("M"));
        assert_eq!(df.get(3, "gender"), None);
    }

    #[test]
    fn test_address() {
        let mut df = sample();
        df.check_column("address", address).unwrap();
        assert_eq!(df.get(0, "address"), Some("123 Main St"));
        assert_eq!(df.get(1, "address"), Some("456 Oak Ave"));
        assert_eq!(df.get(2, "address"), None);
        assert_eq!(df.get(3, "address"), None);
    }

    #[test]
    fn test_city() {
        let mut df = sample();
        df.check_column("city", city).unwrap();
        assert_eq!(df.get(0, "city"), Some("Boston"));
        assert_eq!(df.get(1, "city"), Some("New York"));
        assert_eq!(df.get(2, "city"), None);
        assert_eq!(df.get(3, "city"), None);
    }

    #[test]
    fn test_state() {
        let mut df = sample();
        df.check_column("state", state).unwrap();
        assert_eq!(df.get(0, "state"), Some("MA"));
        assert_eq!(df.get(1, "state"), Some("NY"));
        assert_eq!(df.get(2, "state"), None);
        assert_eq!(df.get(3, "state"), None);
        assert_eq!(state(Some("ca")), Check::Set("CA".into()));
    }

    #[test]
    fn test_zip() {
        let mut df = sample();
        df.check_column("zip", zip).unwrap();
        assert_eq!(df.get(0, "zip"), Some("02108"));
        assert_eq!(df.get(1, "zip"), Some("10001"));
        assert_eq!(df.get(2, "zip"), None);
        assert_eq!(df.get(3, "zip"), Some("12345-6789"));
        assert_eq!(zip(Some("90210.0")), Check::Set("90210".into()));
    }

    #[test]
    fn test_phone() {
        let mut df = sample();
        df.check_column("phone", phone).unwrap();
        assert_eq!(df.get(0, "phone"), Some("(555) 123-4567"));
        assert_eq!(df.get(1, "phone"), Some("(555) 123-4567"));
        assert_eq!(df.get(2, "phone"), Some("(123) 456-7890"));
        assert_eq!(df.get(3, "phone"), None);
    }

    #[test]
    fn test_insurance_id() {
        let mut df = sample();
        df.check_column("insurance_id", insurance_id).unwrap();
        assert_eq!(df.get(0, "insurance_id"), Some("ABC123"));
        assert_eq!(df.get(1, "insurance_id"), Some("XYZ789"));
        assert_eq!(df.get(2, "insurance_id"), None);
        assert_eq!(df.get(3, "insurance_id"), None);
    }

    #[test]
    fn test_clean_normalizes_dates() {
        let mut df = sample();
        clean(&mut df).unwrap();
        assert_eq!(df.get(1, "date_of_birth"), Some("1995-01-15"));
        assert_eq!(df.get(1, "insurance_effective_date"), Some("2024-01-15"));
        assert_eq!(df.get(2, "date_of_birth"), None);
    }
}
