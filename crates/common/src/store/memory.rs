//! In-memory document store for tests and local development
//!
//! Supports equality filters and the `$match`, `$limit`, `$skip`, `$project`
//! and `$count` pipeline stages. Anything else fails the way a server would
//! reject an unknown stage.

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::StreamExt;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{DocumentStore, DocumentStream};
use crate::errors::{QueryError, QueryResult};

/// Collections held in insertion order
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style seeding
    pub fn with_collection(mut self, name: &str, docs: impl IntoIterator<Item = Document>) -> Self {
        self.collections
            .get_mut()
            .entry(name.to_string())
            .or_default()
            .extend(docs);
        self
    }

    pub async fn insert_many(&self, collection: &str, docs: impl IntoIterator<Item = Document>) {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .extend(docs);
    }

    async fn snapshot(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        limit: Option<u64>,
    ) -> QueryResult<DocumentStream> {
        let mut docs = apply_match(self.snapshot(collection).await, &filter)?;
        if let Some(limit) = limit {
            docs.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        Ok(into_stream(docs))
    }

    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> QueryResult<DocumentStream> {
        let mut docs = self.snapshot(collection).await;

        for stage in &pipeline {
            let mut entries = stage.iter();
            let (name, spec) = match (entries.next(), entries.next()) {
                (Some(entry), None) => entry,
                _ => {
                    return Err(QueryError::execution(
                        "A pipeline stage specification object must contain exactly one field.",
                    ))
                }
            };

            docs = match name.as_str() {
                "$match" => apply_match(docs, stage_document(name, spec)?)?,
                "$limit" => {
                    let limit = positive_count(name, spec)?;
                    docs.truncate(limit);
                    docs
                }
                "$skip" => {
                    let skip = non_negative_count(name, spec)?;
                    docs.into_iter().skip(skip).collect()
                }
                "$project" => apply_project(docs, stage_document(name, spec)?)?,
                "$count" => apply_count(docs, spec)?,
                other => {
                    return Err(QueryError::execution(format!(
                        "Unrecognized pipeline stage name: '{}'",
                        other
                    )))
                }
            };
        }

        Ok(into_stream(docs))
    }

    async fn ping(&self) -> QueryResult<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

fn into_stream(docs: Vec<Document>) -> DocumentStream {
    futures::stream::iter(docs.into_iter().map(Ok)).boxed()
}

fn stage_document<'a>(name: &str, spec: &'a Bson) -> QueryResult<&'a Document> {
    spec.as_document().ok_or_else(|| {
        QueryError::execution(format!("the {} specification must be an object", name))
    })
}

fn integral(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        Bson::Double(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
        _ => None,
    }
}

fn positive_count(name: &str, spec: &Bson) -> QueryResult<usize> {
    integral(spec)
        .filter(|n| *n > 0)
        .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
        .ok_or_else(|| QueryError::execution(format!("the {} must be positive", name)))
}

fn non_negative_count(name: &str, spec: &Bson) -> QueryResult<usize> {
    integral(spec)
        .filter(|n| *n >= 0)
        .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
        .ok_or_else(|| QueryError::execution(format!("the {} must be non-negative", name)))
}

fn apply_match(docs: Vec<Document>, filter: &Document) -> QueryResult<Vec<Document>> {
    for (key, value) in filter {
        let uses_operator = key.starts_with('$')
            || value
                .as_document()
                .is_some_and(|inner| inner.keys().any(|k| k.starts_with('$')));
        if uses_operator {
            return Err(QueryError::execution(format!(
                "memory store supports equality filters only, got operator on '{}'",
                key
            )));
        }
    }

    Ok(docs
        .into_iter()
        .filter(|doc| filter.iter().all(|(key, value)| doc.get(key) == Some(value)))
        .collect())
}

fn truthy(field: &str, value: &Bson) -> QueryResult<bool> {
    match value {
        Bson::Boolean(b) => Ok(*b),
        other => integral(other).map(|n| n != 0).ok_or_else(|| {
            QueryError::execution(format!(
                "memory store supports only inclusion or exclusion in $project, got expression for '{}'",
                field
            ))
        }),
    }
}

fn apply_project(docs: Vec<Document>, projection: &Document) -> QueryResult<Vec<Document>> {
    let mut exclude_id = false;
    let mut included = Vec::new();
    let mut excluded = Vec::new();

    for (field, value) in projection {
        let keep = truthy(field, value)?;
        match (field.as_str(), keep) {
            ("_id", false) => exclude_id = true,
            ("_id", true) => {}
            (_, true) => included.push(field.as_str()),
            (_, false) => excluded.push(field.as_str()),
        }
    }

    if !included.is_empty() && !excluded.is_empty() {
        return Err(QueryError::execution(
            "Cannot do exclusion on field in inclusion projection",
        ));
    }

    Ok(docs
        .into_iter()
        .map(|doc| {
            doc.into_iter()
                .filter(|(key, _)| {
                    if key == "_id" {
                        !exclude_id
                    } else if included.is_empty() {
                        !excluded.contains(&key.as_str())
                    } else {
                        included.contains(&key.as_str())
                    }
                })
                .collect()
        })
        .collect())
}

fn apply_count(docs: Vec<Document>, spec: &Bson) -> QueryResult<Vec<Document>> {
    let field = match spec {
        Bson::String(field) if !field.is_empty() && !field.starts_with('$') => field,
        _ => {
            return Err(QueryError::execution(
                "the count field must be a non-empty string not starting with '$'",
            ))
        }
    };

    if docs.is_empty() {
        return Ok(Vec::new());
    }

    let count = i32::try_from(docs.len()).map(Bson::Int32).unwrap_or_else(|_| {
        Bson::Int64(i64::try_from(docs.len()).unwrap_or(i64::MAX))
    });
    let mut result = Document::new();
    result.insert(field.clone(), count);
    Ok(vec![result])
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use futures::TryStreamExt;

    fn store() -> MemoryStore {
        MemoryStore::new().with_collection(
            "users",
            vec![
                doc! { "_id": 1, "name": "Alice", "city": "Boston", "age": 30 },
                doc! { "_id": 2, "name": "Bob", "city": "Austin", "age": 41 },
                doc! { "_id": 3, "name": "Carol", "city": "Boston", "age": 25 },
            ],
        )
    }

    async fn collect(stream: DocumentStream) -> Vec<Document> {
        stream.try_collect().await.unwrap()
    }

    #[tokio::test]
    async fn test_find_equality_preserves_insertion_order() {
        let docs = collect(store().find("users", doc! { "city": "Boston" }, None).await.unwrap()).await;
        let names: Vec<_> = docs.iter().map(|d| d.get_str("name").unwrap()).collect();
        assert_eq!(names, vec!["Alice", "Carol"]);
    }

    #[tokio::test]
    async fn test_find_with_limit() {
        let docs = collect(store().find("users", Document::new(), Some(2)).await.unwrap()).await;
        assert_eq!(docs.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_collection_is_empty() {
        let docs = collect(store().find("nobody", Document::new(), None).await.unwrap()).await;
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn test_operator_filter_is_rejected() {
        let result = store().find("users", doc! { "age": { "$gt": 30 } }, None).await;
        assert!(matches!(result, Err(QueryError::Execution { .. })));
    }

    #[tokio::test]
    async fn test_insert_many_appends() {
        let store = store();
        store.insert_many("users", vec![doc! { "_id": 4, "name": "Dan" }]).await;

        let docs = collect(store.find("users", Document::new(), None).await.unwrap()).await;
        assert_eq!(docs.len(), 4);
        assert_eq!(docs[3].get_str("name").unwrap(), "Dan");
    }

    #[tokio::test]
    async fn test_pipeline_stages_run_in_order() {
        let pipeline = vec![
            doc! { "$match": { "city": "Boston" } },
            doc! { "$skip": 1 },
            doc! { "$project": { "_id": 0, "name": 1 } },
        ];

        let docs = collect(store().aggregate("users", pipeline).await.unwrap()).await;
        assert_eq!(docs, vec![doc! { "name": "Carol" }]);
    }

    #[tokio::test]
    async fn test_exclusion_projection_and_count() {
        let docs = collect(
            store()
                .aggregate("users", vec![doc! { "$limit": 1 }, doc! { "$project": { "age": 0 } }])
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(docs, vec![doc! { "_id": 1, "name": "Alice", "city": "Boston" }]);

        let docs = collect(store().aggregate("users", vec![doc! { "$count": "total" }]).await.unwrap()).await;
        assert_eq!(docs, vec![doc! { "total": 3 }]);
    }

    #[tokio::test]
    async fn test_unknown_stage_is_an_execution_error() {
        let err = store()
            .aggregate("users", vec![doc! { "$bogus": {} }])
            .await
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "Unrecognized pipeline stage name: '$bogus'");
    }

    #[tokio::test]
    async fn test_zero_limit_stage_is_rejected() {
        let err = store()
            .aggregate("users", vec![doc! { "$limit": 0 }])
            .await
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "the $limit must be positive");
    }
}
