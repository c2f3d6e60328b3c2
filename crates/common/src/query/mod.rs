//! Query translation pipeline
//!
//! Raw model text → candidate text → query spec → query plan:
//! - `extract`: fenced-block extraction
//! - `parser`: strict JSON, then the permissive literal grammar
//! - `literal`: the data-literal grammar itself
//! - `plan`: classification into an executable plan

mod extract;
mod literal;
mod parser;
mod plan;

pub use extract::{extract_candidate, Candidate};
pub use literal::{parse_literal, LiteralError, MAX_NESTING};
pub use parser::{parse_query_spec, ParsedWith};
pub use plan::{interpret, QueryPlan};

use serde_json::{Map, Value};

/// Untyped query spec as produced by the model
pub type QuerySpec = Map<String, Value>;

/// Human-readable type name of an untyped value
pub fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Object(_) => "mapping",
        Value::Array(_) => "sequence",
        Value::String(_) => "string",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::Bool(_) => "boolean",
        Value::Null => "null",
    }
}
