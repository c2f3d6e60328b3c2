//! Result serialization
//!
//! Rewrites store-native values into plain data so results can be
//! rendered as JSON text:
//! - `ObjectId` → 24-char lowercase hex string
//! - `DateTime` → ISO-8601 string in UTC with millisecond precision
//! - `Timestamp` → ISO-8601 string of its seconds component
//!
//! Everything else is returned unchanged. Serializing twice yields the
//! same result as serializing once.

use bson::{Bson, Document};
use chrono::SecondsFormat;
use serde_json::Value;

use crate::errors::{QueryError, QueryResult};

/// Maximum nesting of documents and arrays accepted in a result
pub const MAX_SERIALIZE_DEPTH: usize = 128;

/// Serialize one result document
pub fn serialize_document(doc: &Document) -> QueryResult<Document> {
    serialize_document_at(doc, 0)
}

/// Serialize a single value
pub fn serialize_value(value: &Bson) -> QueryResult<Bson> {
    serialize_value_at(value, 0)
}

/// Render a serialized document as JSON, keeping key order
pub fn to_json(doc: Document) -> Value {
    Bson::Document(doc).into_relaxed_extjson()
}

fn depth_guard(depth: usize) -> QueryResult<()> {
    if depth > MAX_SERIALIZE_DEPTH {
        return Err(QueryError::DepthLimitExceeded {
            limit: MAX_SERIALIZE_DEPTH,
        });
    }
    Ok(())
}

fn serialize_document_at(doc: &Document, depth: usize) -> QueryResult<Document> {
    depth_guard(depth)?;
    doc.iter()
        .map(|(key, value)| Ok((key.clone(), serialize_value_at(value, depth)?)))
        .collect()
}

fn serialize_value_at(value: &Bson, depth: usize) -> QueryResult<Bson> {
    match value {
        Bson::ObjectId(oid) => Ok(Bson::String(oid.to_hex())),
        Bson::DateTime(dt) => Ok(Bson::String(
            dt.to_chrono().to_rfc3339_opts(SecondsFormat::Millis, true),
        )),
        Bson::Timestamp(ts) => Ok(Bson::String(
            chrono::DateTime::from_timestamp(i64::from(ts.time), 0)
                .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_else(|| ts.time.to_string()),
        )),
        Bson::Document(doc) => serialize_document_at(doc, depth + 1).map(Bson::Document),
        Bson::Array(items) => {
            depth_guard(depth + 1)?;
            items
                .iter()
                .map(|item| serialize_value_at(item, depth + 1))
                .collect::<QueryResult<Vec<_>>>()
                .map(Bson::Array)
        }
        other => Ok(other.clone()),
    }
}
