//! Query Spec Parser - Turns candidate text into an untyped query spec
//!
//! Strict JSON first, then the permissive literal grammar. Both diagnostics and the
//! raw model response are kept when neither succeeds.

use serde_json::Value;

use super::extract::Candidate;
use super::literal::parse_literal;
use super::{value_type_name, QuerySpec};
use crate::errors::{QueryError, QueryResult};

/// Which grammar accepted the candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedWith {
    Json,
    Literal,
}

impl ParsedWith {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParsedWith::Json => "json",
            ParsedWith::Literal => "literal",
        }
    }
}

/// Parse candidate text into a query spec mapping
pub fn parse_query_spec(candidate: &Candidate<'_>) -> QueryResult<(QuerySpec, ParsedWith)> {
    let (value, parsed_with) = match serde_json::from_str::<Value>(candidate.text) {
        Ok(value) => (value, ParsedWith::Json),
        Err(json_error) => {
            tracing::warn!(error = %json_error, "Strict JSON parse failed, trying literal grammar");

            match parse_literal(candidate.text) {
                Ok(value) => (value, ParsedWith::Literal),
                Err(literal_error) => {
                    tracing::error!(
                        json_error = %json_error,
                        literal_error = %literal_error,
                        "Failed to parse query from model"
                    );
                    return Err(QueryError::Parse {
                        json_error: json_error.to_string(),
                        literal_error: literal_error.to_string(),
                        raw: candidate.raw.to_string(),
                    });
                }
            }
        }
    };

    match value {
        Value::Object(spec) => {
            tracing::debug!(parser = parsed_with.as_str(), "Parsed query spec");
            Ok((spec, parsed_with))
        }
        other => Err(QueryError::TypeMismatch {
            actual: value_type_name(&other).to_string(),
            raw: candidate.raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::extract::extract_candidate;
    use serde_json::json;

    #[test]
    fn test_strict_json() {
        let candidate = extract_candidate("{\"filter\": {\"city\": \"Boston\"}, \"limit\": 5}");
        let (spec, parsed_with) = parse_query_spec(&candidate).unwrap();

        assert_eq!(parsed_with, ParsedWith::Json);
        assert_eq!(spec["filter"], json!({"city": "Boston"}));
        assert_eq!(spec["limit"], json!(5));
    }

    #[test]
    fn test_literal_fallback() {
        let candidate = extract_candidate("{'name': 'Alice', 'age': 30}");
        let (spec, parsed_with) = parse_query_spec(&candidate).unwrap();

        assert_eq!(parsed_with, ParsedWith::Literal);
        assert_eq!(Value::Object(spec), json!({"name": "Alice", "age": 30}));
    }

    #[test]
    fn test_both_parsers_fail() {
        let raw = "Sure! Here you go: db.users.find({city: 'Boston'})";
        let candidate = extract_candidate(raw);
        let err = parse_query_spec(&candidate).unwrap_err();

        match err {
            QueryError::Parse {
                json_error,
                literal_error,
                raw: echoed,
            } => {
                assert!(json_error.contains("line 1"));
                assert!(literal_error.contains("unexpected character '!'"));
                assert_eq!(echoed, raw);
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_echoes_full_response_not_candidate() {
        let raw = "```json\n{\"filter\": {\"city\": }}\n```";
        let candidate = extract_candidate(raw);
        assert!(candidate.fenced);

        let err = parse_query_spec(&candidate).unwrap_err();
        assert!(matches!(err, QueryError::Parse { raw: ref echoed, .. } if echoed == raw));
    }

    #[test]
    fn test_non_mapping_is_type_mismatch() {
        let candidate = extract_candidate("[{\"$match\": {}}]");
        let err = parse_query_spec(&candidate).unwrap_err();

        assert_eq!(
            err,
            QueryError::TypeMismatch {
                actual: "sequence".to_string(),
                raw: "[{\"$match\": {}}]".to_string(),
            }
        );
        assert!(err.to_string().contains("expected a mapping, but got sequence"));
    }

    #[test]
    fn test_literal_scalar_is_type_mismatch() {
        let candidate = extract_candidate("'just a string'");
        let err = parse_query_spec(&candidate).unwrap_err();
        assert!(matches!(err, QueryError::TypeMismatch { ref actual, .. } if actual == "string"));
    }
}
