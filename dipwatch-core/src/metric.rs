//! Human-formatted metric parsing.
//!
//! Reference metrics arrive as display strings such as `$12.3K` or `1,250,000`.
//! Provider payloads carry the same shapes, sometimes quoted.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("empty metric")]
    Empty,

    #[error("null metric")]
    Null,

    #[error("not a number: {0:?}")]
    NotNumeric(String),

    #[error("metric is not finite: {0:?}")]
    NotFinite(String),
}

/// Parse a metric string with optional `$`, thousands separators and a `k`/`m`
/// suffix (case-insensitive, ×1,000 / ×1,000,000).
///
/// Empty and `null` inputs are errors, never zero.
pub fn parse_metric(text: &str) -> Result<f64, ParseError> {
    let trimmed = text.trim().trim_matches('"').trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }

    let lowered = trimmed.to_ascii_lowercase();
    if lowered == "null" || lowered == "none" {
        return Err(ParseError::Null);
    }

    let cleaned: String = lowered
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | '_') && !c.is_whitespace())
        .collect();

    let (digits, multiplier) = match cleaned.as_bytes().last() {
        Some(b'k') => (&cleaned[..cleaned.len() - 1], 1_000.0),
        Some(b'm') => (&cleaned[..cleaned.len() - 1], 1_000_000.0),
        _ => (cleaned.as_str(), 1.0),
    };

    if digits.is_empty() {
        return Err(ParseError::NotNumeric(text.to_string()));
    }

    let base: f64 = digits
        .parse()
        .map_err(|_| ParseError::NotNumeric(text.to_string()))?;

    let value = base * multiplier;
    if !value.is_finite() {
        return Err(ParseError::NotFinite(text.to_string()));
    }

    // 2.3 * 1e6 is 2299999.9999999995 in binary floating point
    Ok((value * 1e6).round() / 1e6)
}
