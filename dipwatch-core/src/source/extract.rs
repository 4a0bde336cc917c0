//! Field extraction from provider response bodies.
//!
//! Providers return either a JSON document (fields addressed by JSON pointer)
//! or a page with an embedded data blob (fields found by scanning for `"key":`).
//! Only the primary field is required; secondary fields degrade to `None`.

use super::SourceError;
use crate::domain::SecondarySignals;
use crate::metric::parse_metric;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Names (or JSON pointers) of the fields to pull out of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPaths {
    pub market_cap: String,
    #[serde(default)]
    pub volume: Option<String>,
    #[serde(default)]
    pub holders: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum FieldExtractor {
    /// Body is JSON; each path is a JSON pointer such as `/data/attributes/fdv_usd`.
    Json(FieldPaths),
    /// Body is semi-structured text; each path is a key scanned as `"key":`.
    Text(FieldPaths),
}

/// Fields pulled from one response.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub market_cap: f64,
    pub signals: SecondarySignals,
    pub created_at: Option<DateTime<Utc>>,
}

impl FieldExtractor {
    /// Pull the market cap and any secondary fields out of `body`.
    ///
    /// A missing or non-numeric market cap is an error; secondary fields degrade to `None`.
    pub fn extract(&self, body: &str) -> Result<Extracted, SourceError> {
        match self {
            FieldExtractor::Json(paths) => {
                let doc: Value = serde_json::from_str(body)
                    .map_err(|e| SourceError::MalformedPayload(e.to_string()))?;
                extract_with(paths, |path| json_field(&doc, path))
            }
            FieldExtractor::Text(paths) => extract_with(paths, |key| text_field(body, key)),
        }
    }
}

/// A located field before numeric interpretation.
enum RawField {
    Number(f64),
    Text(String),
}

fn extract_with<F>(paths: &FieldPaths, lookup: F) -> Result<Extracted, SourceError>
where
    F: Fn(&str) -> Option<RawField>,
{
    let market_cap = match lookup(&paths.market_cap) {
        Some(raw) => numeric(&raw).map_err(|reason| SourceError::NotNumeric {
            field: paths.market_cap.clone(),
            reason,
        })?,
        None => {
            return Err(SourceError::MissingField {
                field: paths.market_cap.clone(),
            })
        }
    };

    let optional = |path: &Option<String>| {
        path.as_deref()
            .and_then(&lookup)
            .and_then(|raw| numeric(&raw).ok())
    };

    let created_at = paths
        .created_at
        .as_deref()
        .and_then(&lookup)
        .and_then(|raw| timestamp(&raw));

    Ok(Extracted {
        market_cap,
        signals: SecondarySignals {
            volume: optional(&paths.volume),
            holders: optional(&paths.holders),
        },
        created_at,
    })
}

fn numeric(raw: &RawField) -> Result<f64, String> {
    match raw {
        RawField::Number(n) if n.is_finite() => Ok(*n),
        RawField::Number(n) => Err(format!("non-finite value {n}")),
        RawField::Text(t) => parse_metric(t).map_err(|e| e.to_string()),
    }
}

/// Unix seconds, unix milliseconds, or RFC 3339.
fn timestamp(raw: &RawField) -> Option<DateTime<Utc>> {
    let n = match raw {
        RawField::Number(n) => *n,
        RawField::Text(t) => {
            let t = t.trim().trim_matches('"');
            match t.parse::<f64>() {
                Ok(n) => n,
                Err(_) => {
                    return DateTime::parse_from_rfc3339(t)
                        .ok()
                        .map(|dt| dt.with_timezone(&Utc))
                }
            }
        }
    };
    if !n.is_finite() || n <= 0.0 {
        return None;
    }
    if n > 1e11 {
        DateTime::from_timestamp_millis(n as i64)
    } else {
        DateTime::from_timestamp(n as i64, 0)
    }
}

fn json_field(doc: &Value, path: &str) -> Option<RawField> {
    let value = if path.starts_with('/') {
        doc.pointer(path)?
    } else {
        doc.get(path)?
    };
    match value {
        Value::Number(n) => n.as_f64().map(RawField::Number),
        Value::String(s) => Some(RawField::Text(s.clone())),
        // Present but null: surfaced as text so parse_metric rejects it.
        Value::Null => Some(RawField::Text("null".into())),
        _ => None,
    }
}

/// Find `"key"` followed by optional whitespace and `:`, and return the raw token
/// up to the next `,`, `}` or newline.
fn text_field(body: &str, key: &str) -> Option<RawField> {
    let needle = format!("\"{key}\"");
    let mut search_from = 0;
    while let Some(pos) = body[search_from..].find(&needle) {
        let after = search_from + pos + needle.len();
        let rest = body[after..].trim_start();
        if let Some(value) = rest.strip_prefix(':') {
            let value = value.trim_start();
            let token = if let Some(quoted) = value.strip_prefix('"') {
                quoted.split('"').next().unwrap_or_default()
            } else {
                value
                    .split(|c| c == ',' || c == '}' || c == '\n')
                    .next()
                    .unwrap_or_default()
            };
            return Some(RawField::Text(token.trim().to_string()));
        }
        search_from = after;
    }
    None
}
