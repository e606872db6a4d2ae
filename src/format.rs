//! Value shape helpers shared by the filter compiler and row coercer

use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%Y.%m.%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y", "%d-%m-%Y", "%Y.%m.%d", "%d. %m. %Y"];

fn numeric_regex() -> &'static Regex {
    static NUMERIC: OnceLock<Regex> = OnceLock::new();
    NUMERIC.get_or_init(|| {
        Regex::new(r"^\s*[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?\s*$").expect("valid regex")
    })
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid regex")
    })
}

/// Whether the string is a decimal or scientific number literal
pub fn is_numeric(value: &str) -> bool {
    numeric_regex().is_match(value)
}

pub fn is_email(value: &str) -> bool {
    email_regex().is_match(value.trim())
}

/// Numeric string as a JSON number, integers preferred
pub fn numeric_value(value: &str) -> Option<serde_json::Value> {
    if !is_numeric(value) {
        return None;
    }
    let value = value.trim();
    if let Ok(int) = value.parse::<i64>() {
        return Some(serde_json::Value::from(int));
    }
    value
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(serde_json::Value::Number)
}

/// Parse a value that looks like a date or timestamp
///
/// A value qualifies when it contains a digit and a `-` or `.`, and parses
/// under one of the accepted layouts. Plain decimals such as `10.5` carry the
/// punctuation but never parse, so they stay numbers.
pub fn parse_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if !value.chars().any(|c| c.is_ascii_digit()) || !value.contains(['-', '.']) {
        return None;
    }
    if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(value) {
        return Some(parsed.naive_local());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Reformat a date-like value with the given chrono format
pub fn reformat_date(value: &str, format: &str) -> Option<String> {
    parse_date(value).map(|parsed| parsed.format(format).to_string())
}

/// Strip the leading `_` escape used by select widgets
pub fn strip_escape(value: &str) -> &str {
    value.trim_start_matches('_')
}

/// Upper-case the first character
pub fn ucfirst(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Null, empty string, empty array or empty object
pub fn is_blank(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.is_empty(),
        serde_json::Value::Array(a) => a.is_empty(),
        serde_json::Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Scalar rendered as text, as it would appear in a form field
pub fn scalar_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_numeric() {
        assert!(is_numeric("100"));
        assert!(is_numeric("-10.5"));
        assert!(is_numeric(".5"));
        assert!(is_numeric("1e3"));
        assert!(!is_numeric("10a"));
        assert!(!is_numeric(""));
        assert!(!is_numeric("2024-01-01"));
    }

    #[test]
    fn test_numeric_value_prefers_integers() {
        assert_eq!(numeric_value("100"), Some(serde_json::json!(100)));
        assert_eq!(numeric_value("10.5"), Some(serde_json::json!(10.5)));
        assert_eq!(numeric_value("abc"), None);
    }

    #[test]
    fn test_parse_date_layouts() {
        let iso = parse_date("2024-03-01").unwrap();
        assert_eq!(iso.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-03-01 00:00:00");
        let czech = parse_date("01.03.2024 10:30").unwrap();
        assert_eq!(czech.format("%Y-%m-%d %H:%M").to_string(), "2024-03-01 10:30");
    }

    #[test]
    fn test_decimals_are_not_dates() {
        assert!(parse_date("10.5").is_none());
        assert!(parse_date("-3").is_none());
        assert!(parse_date("john").is_none());
    }

    #[test]
    fn test_reformat_date() {
        assert_eq!(
            reformat_date("2024-03-01", "%d.%m.%Y"),
            Some("01.03.2024".to_string())
        );
    }

    #[test]
    fn test_is_email() {
        assert!(is_email("jane@example.com"));
        assert!(!is_email("jane@"));
        assert!(!is_email("not an email"));
    }

    #[test]
    fn test_text_helpers() {
        assert_eq!(strip_escape("__5"), "5");
        assert_eq!(ucfirst("name"), "Name");
        assert_eq!(ucfirst(""), "");
        assert!(is_blank(&serde_json::json!([])));
        assert!(!is_blank(&serde_json::json!(0)));
        assert_eq!(scalar_text(&serde_json::json!(1.5)), "1.5");
    }
}
