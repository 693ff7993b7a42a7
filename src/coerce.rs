//! Value-level coercion shared by the normalizer and the unifier.

use crate::config::CoercionPolicy;
use crate::error::{EtlError, Result};
use crate::table::ColumnType;
use chrono::{Datelike, NaiveDate};

/// Parses a numeric cell. Accepts a single decimal comma when no dot is present.
pub fn parse_number(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Some(i as f64);
    }
    let parsed = match s.parse::<f64>() {
        Ok(f) => Some(f),
        Err(_) if !s.contains('.') && s.matches(',').count() == 1 => {
            s.replace(',', ".").parse::<f64>().ok()
        }
        Err(_) => None,
    };
    parsed.filter(|f| f.is_finite())
}

/// Coerces a count cell into a non-negative integer.
///
/// Missing cells become 0 under both policies. Unparseable or negative values
/// become 0 under `ClampToZero` and an error under `Reject`.
pub fn coerce_count(
    raw: Option<&str>,
    policy: CoercionPolicy,
    column: &str,
    row: usize,
) -> Result<i64> {
    let Some(raw) = raw else { return Ok(0) };
    match parse_number(raw) {
        Some(f) if f >= 0.0 => Ok(f.trunc() as i64),
        _ if policy == CoercionPolicy::ClampToZero => Ok(0),
        _ => Err(EtlError::Coercion {
            column: column.to_string(),
            row,
            value: raw.to_string(),
        }),
    }
}

/// Parses an integer-valued cell (e.g. a year), allowing a zero fraction.
pub fn parse_integer(raw: &str) -> Option<i64> {
    match parse_number(raw) {
        Some(f) if f.fract() == 0.0 => Some(f as i64),
        _ => None,
    }
}

/// Parses a date cell against `format`. Anything that does not match exactly,
/// including years outside four digits, is `None`.
pub fn parse_date(raw: &str, format: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    // chrono lets numeric fields carry a sign or leading spaces
    let loose = |c: char| {
        (c == '+' && !format.contains('+'))
            || (c.is_whitespace() && !format.contains(char::is_whitespace))
    };
    if s.chars().any(loose) {
        return None;
    }
    let date = NaiveDate::parse_from_str(s, format).ok()?;
    if format.contains("%Y") && !(1000..=9999).contains(&date.year()) {
        return None;
    }
    Some(date)
}

/// Narrowest type every non-null value fits. All-null columns are text.
pub fn infer_type<'a, I>(values: I) -> ColumnType
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut seen = false;
    let mut integer = true;
    let mut float = true;
    for v in values.into_iter().flatten() {
        seen = true;
        let s = v.trim();
        if integer && s.parse::<i64>().is_err() {
            integer = false;
        }
        if !integer && s.parse::<f64>().map(|f| !f.is_finite()).unwrap_or(true) {
            float = false;
            break;
        }
    }
    match (seen, integer, float) {
        (false, _, _) => ColumnType::Text,
        (true, true, _) => ColumnType::Integer,
        (true, false, true) => ColumnType::Float,
        _ => ColumnType::Text,
    }
}

/// Replaces null and null-marker text with the empty string.
pub fn blank_null_markers(value: Option<String>, markers: &[String]) -> String {
    match value {
        Some(s) if markers.iter().any(|m| *m == s) => String::new(),
        Some(s) => s,
        None => String::new(),
    }
}
