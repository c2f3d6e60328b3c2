//! Query Interpreter - Classifies a query spec into an executable plan
//!
//! Fixed key priority, no inference:
//! - `aggregate` holding a sequence → `Aggregate`
//! - otherwise `Find`, filter from `filter` → `$match` → `{}`,
//!   limit from `limit` → `$limit` → unlimited
//!
//! The first key present wins outright; `filter`/`$match` and `limit`/`$limit`
//! are never merged.

use serde_json::{Map, Value};

use super::QuerySpec;
use crate::errors::{QueryError, QueryResult};

/// Executable query plan
#[derive(Debug, Clone, PartialEq)]
pub enum QueryPlan {
    /// Run stages in order; never empty
    Aggregate { pipeline: Vec<Value> },

    /// Filter query; a limit of 0 means unlimited
    Find { filter: Map<String, Value>, limit: u64 },
}

impl QueryPlan {
    /// Operation name used in logs and metrics labels
    pub fn operation(&self) -> &'static str {
        match self {
            QueryPlan::Aggregate { .. } => "aggregate",
            QueryPlan::Find { .. } => "find",
        }
    }
}

/// Interpret a parsed query spec
pub fn interpret(spec: &QuerySpec) -> QueryResult<QueryPlan> {
    if let Some(Value::Array(pipeline)) = spec.get("aggregate") {
        if pipeline.is_empty() {
            return Err(QueryError::EmptyPipeline);
        }

        tracing::info!(stages = pipeline.len(), "Detected an aggregation pipeline");
        return Ok(QueryPlan::Aggregate {
            pipeline: pipeline.clone(),
        });
    }

    let filter = match first_present(spec, &["filter", "$match"]) {
        None => Map::new(),
        Some(Value::Object(filter)) => filter.clone(),
        Some(other) => {
            tracing::warn!(filter = %other, "Filter is not a mapping, defaulting to {{}}");
            Map::new()
        }
    };

    let limit = first_present(spec, &["limit", "$limit"])
        .and_then(Value::as_u64)
        .unwrap_or(0);

    tracing::info!(limit, "Detected a find operation");
    Ok(QueryPlan::Find { filter, limit })
}

/// Value of the first key present, even when that value is unusable
fn first_present<'a>(spec: &'a QuerySpec, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| spec.get(*key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(value: Value) -> QuerySpec {
        match value {
            Value::Object(map) => map,
            other => panic!("test spec must be an object, got {}", other),
        }
    }

    #[test]
    fn test_find_with_filter_and_limit() {
        let plan = interpret(&spec(json!({"filter": {"city": "Boston"}, "limit": 5}))).unwrap();

        assert_eq!(
            plan,
            QueryPlan::Find {
                filter: spec(json!({"city": "Boston"})),
                limit: 5,
            }
        );
        assert_eq!(plan.operation(), "find");
    }

    #[test]
    fn test_aggregate_uses_exact_pipeline() {
        let pipeline = json!([{"$match": {"year": 2015}}, {"$limit": 3}]);
        let plan = interpret(&spec(json!({"aggregate": pipeline.clone()}))).unwrap();

        assert_eq!(
            plan,
            QueryPlan::Aggregate {
                pipeline: pipeline.as_array().unwrap().clone(),
            }
        );
    }

    #[test]
    fn test_empty_pipeline_is_an_error() {
        let err = interpret(&spec(json!({"aggregate": []}))).unwrap_err();
        assert_eq!(err, QueryError::EmptyPipeline);
    }

    #[test]
    fn test_aggregate_that_is_not_a_sequence_falls_back_to_find() {
        let plan = interpret(&spec(json!({"aggregate": {"$match": {}}, "filter": {"a": 1}}))).unwrap();
        assert_eq!(
            plan,
            QueryPlan::Find {
                filter: spec(json!({"a": 1})),
                limit: 0,
            }
        );
    }

    #[test]
    fn test_spec_without_known_keys_is_unfiltered_find() {
        let plan = interpret(&spec(json!({"name": "Alice", "age": 30}))).unwrap();
        assert_eq!(
            plan,
            QueryPlan::Find {
                filter: Map::new(),
                limit: 0,
            }
        );
    }

    #[test]
    fn test_match_and_dollar_limit_are_fallbacks() {
        let plan = interpret(&spec(json!({"$match": {"city": "Austin"}, "$limit": 7}))).unwrap();
        assert_eq!(
            plan,
            QueryPlan::Find {
                filter: spec(json!({"city": "Austin"})),
                limit: 7,
            }
        );
    }

    #[test]
    fn test_priority_is_exclusive() {
        let plan = interpret(&spec(json!({
            "$match": {"city": "Austin"},
            "filter": {"age": 30},
            "$limit": 7,
            "limit": 2
        })))
        .unwrap();

        assert_eq!(
            plan,
            QueryPlan::Find {
                filter: spec(json!({"age": 30})),
                limit: 2,
            }
        );
    }

    #[test]
    fn test_unusable_filter_does_not_fall_through() {
        let plan = interpret(&spec(json!({"filter": null, "$match": {"city": "Austin"}}))).unwrap();
        assert_eq!(
            plan,
            QueryPlan::Find {
                filter: Map::new(),
                limit: 0,
            }
        );

        let plan = interpret(&spec(json!({"filter": ["city", "Austin"]}))).unwrap();
        assert!(matches!(plan, QueryPlan::Find { ref filter, .. } if filter.is_empty()));
    }

    #[test]
    fn test_only_positive_integers_cap() {
        for limit in [json!(-3), json!(0), json!(2.5), json!("5"), json!(true), json!(null)] {
            let plan = interpret(&spec(json!({"limit": limit.clone(), "$limit": 4}))).unwrap();
            assert!(
                matches!(plan, QueryPlan::Find { limit: 0, .. }),
                "limit {} should mean unlimited",
                limit
            );
        }
    }
}
