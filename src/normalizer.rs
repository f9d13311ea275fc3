//! Normalization of user- and CSV-entered amounts into integer yen.
//!
//! Input arrives as a JSON number, a string such as `"¥1,234,567"`,
//! `"１２３円"` or `"12,000 yen"`, or nothing at all. Every shape resolves to a
//! rounded integer; anything unparseable becomes `0`.

use crate::utils::round_half_up;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Offset between a full-width ASCII variant (U+FF01..U+FF5E) and its
/// half-width counterpart.
const FULL_WIDTH_OFFSET: u32 = 0xFEE0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(untagged)]
pub enum NumericInput {
    Number(f64),
    Text(String),
    #[default]
    Missing,
}

impl From<i64> for NumericInput {
    fn from(value: i64) -> Self {
        NumericInput::Number(value as f64)
    }
}

impl From<f64> for NumericInput {
    fn from(value: f64) -> Self {
        NumericInput::Number(value)
    }
}

impl From<&str> for NumericInput {
    fn from(value: &str) -> Self {
        NumericInput::Text(value.to_string())
    }
}

impl From<String> for NumericInput {
    fn from(value: String) -> Self {
        NumericInput::Text(value)
    }
}

impl<T: Into<NumericInput>> From<Option<T>> for NumericInput {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(NumericInput::Missing)
    }
}

impl NumericInput {
    pub fn normalize(&self) -> i64 {
        normalize_numeric_input(self)
    }
}

pub fn normalize_numeric_input(input: &NumericInput) -> i64 {
    match input {
        NumericInput::Number(n) if n.is_finite() => round_half_up(*n),
        NumericInput::Number(_) => 0,
        NumericInput::Text(s) => normalize_amount_str(s),
        NumericInput::Missing => 0,
    }
}

pub fn normalize_amount_str(input: &str) -> i64 {
    let cleaned: String = input
        .chars()
        .map(to_half_width)
        .filter(|c| !matches!(c, '¥' | '￥' | '円'))
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();

    match parse_leading_float(&cleaned) {
        Some(value) if value.is_finite() => round_half_up(value),
        _ => 0,
    }
}

fn to_half_width(c: char) -> char {
    let code = c as u32;
    if (0xFF01..=0xFF5E).contains(&code) {
        char::from_u32(code - FULL_WIDTH_OFFSET).unwrap_or(c)
    } else {
        c
    }
}

/// Parses the longest numeric prefix (`-?digits[.digits]`), so `"12-3"`
/// reads as 12 and `"1.2.3"` as 1.2. Returns `None` when no digit leads.
fn parse_leading_float(s: &str) -> Option<f64> {
    let bytes = s.as_bytes();
    let mut end = 0;
    if bytes.first() == Some(&b'-') {
        end = 1;
    }

    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;

    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        if frac_end > frac_start || digits > 0 {
            end = frac_end;
        }
    }

    if digits == 0 {
        return None;
    }
    s[..end].trim_end_matches('.').parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_and_separators() {
        assert_eq!(normalize_amount_str("¥1,234,567"), 1_234_567);
        assert_eq!(normalize_amount_str("￥12,000"), 12_000);
        assert_eq!(normalize_amount_str("3,500円"), 3_500);
        assert_eq!(normalize_amount_str("  42 yen "), 42);
    }

    #[test]
    fn test_full_width_digits() {
        assert_eq!(normalize_amount_str("１２３"), 123);
        assert_eq!(normalize_amount_str("￥１，０００円"), 1_000);
        assert_eq!(normalize_amount_str("－５００"), -500);
    }

    #[test]
    fn test_unparseable_is_zero() {
        assert_eq!(normalize_amount_str("abc"), 0);
        assert_eq!(normalize_amount_str(""), 0);
        assert_eq!(normalize_amount_str("-"), 0);
        assert_eq!(normalize_amount_str("."), 0);
        assert_eq!(normalize_numeric_input(&NumericInput::Missing), 0);
        assert_eq!(normalize_numeric_input(&NumericInput::Number(f64::NAN)), 0);
    }

    #[test]
    fn test_decimal_and_prefix_parsing() {
        assert_eq!(normalize_amount_str("1234.5"), 1235);
        assert_eq!(normalize_amount_str("1234.4"), 1234);
        assert_eq!(normalize_amount_str("-1.5"), -1);
        assert_eq!(normalize_amount_str("12-3"), 12);
        assert_eq!(normalize_amount_str("1.2.3"), 1);
        assert_eq!(normalize_amount_str(".5"), 1);
        assert_eq!(normalize_amount_str("5."), 5);
    }

    #[test]
    fn test_numbers_pass_through_rounded() {
        assert_eq!(NumericInput::from(1500_i64).normalize(), 1500);
        assert_eq!(NumericInput::from(99.5).normalize(), 100);
        assert_eq!(NumericInput::from(None::<&str>).normalize(), 0);
    }

    #[test]
    fn test_idempotent() {
        let inputs: Vec<NumericInput> = vec![
            "¥1,234,567".into(),
            "１２３".into(),
            "abc".into(),
            "-42.7円".into(),
            NumericInput::Number(17.5),
            NumericInput::Missing,
        ];
        for input in inputs {
            let once = input.normalize();
            let twice = NumericInput::from(once).normalize();
            assert_eq!(once, twice, "input {:?}", input);
            assert_eq!(NumericInput::from(once.to_string()).normalize(), once);
        }
    }

    #[test]
    fn test_deserialize_untagged() {
        let values: Vec<NumericInput> = serde_json::from_str(r#"[1200, "¥3,400", null]"#).unwrap();
        assert_eq!(
            values.iter().map(|v| v.normalize()).collect::<Vec<_>>(),
            vec![1200, 3400, 0]
        );
    }
}
