//! Line protocol for `dipwatch watch`.
//!
//! Each stdin line is one JSON request; each produces one JSON response line.

use dipwatch_runner::Admission;
use serde::Deserialize;
use serde_json::{json, Value};

/// Browser extensions send either field naming.
#[derive(Debug, Deserialize)]
struct Request {
    #[serde(alias = "contractKey")]
    identifier: String,
    #[serde(rename = "referenceMetric", alias = "marketCap")]
    reference_metric: MetricText,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MetricText {
    Text(String),
    Number(f64),
}

/// Decode one request line into `(identifier, reference_text)`.
pub fn parse_request(line: &str) -> Result<(String, String), String> {
    let request: Request = serde_json::from_str(line).map_err(|e| format!("malformed request: {e}"))?;
    let reference = match request.reference_metric {
        MetricText::Text(s) => s,
        MetricText::Number(n) => n.to_string(),
    };
    Ok((request.identifier, reference))
}

/// JSON response for an admission decision.
pub fn admission_response(admission: &Admission) -> Value {
    match admission {
        Admission::Accepted => json!({ "success": true, "status": "accepted" }),
        Admission::Duplicate => json!({ "success": true, "status": "duplicate" }),
        Admission::Rejected(reason) => bad_request(reason),
    }
}

/// JSON response for a request that could not be decoded.
pub fn bad_request(reason: &str) -> Value {
    json!({ "success": false, "status": 400, "error": reason })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_both_field_namings() {
        assert_eq!(
            parse_request(r#"{"identifier": "X", "referenceMetric": "100k"}"#),
            Ok(("X".into(), "100k".into()))
        );
        assert_eq!(
            parse_request(r#"{"contractKey": "Y", "marketCap": "$50K"}"#),
            Ok(("Y".into(), "$50K".into()))
        );
    }

    #[test]
    fn numeric_reference_is_accepted() {
        assert_eq!(
            parse_request(r#"{"identifier": "X", "referenceMetric": 2500}"#),
            Ok(("X".into(), "2500".into()))
        );
    }

    #[test]
    fn malformed_lines_are_errors() {
        assert!(parse_request("not json").is_err());
        assert!(parse_request(r#"{"identifier": "X"}"#).is_err());
    }

    #[test]
    fn responses_match_protocol() {
        assert_eq!(
            admission_response(&Admission::Accepted),
            json!({"success": true, "status": "accepted"})
        );
        assert_eq!(
            admission_response(&Admission::Rejected("bad".into()))["status"],
            json!(400)
        );
    }
}
