//! Document store layer
//!
//! Provides:
//! - The `DocumentStore` capability (filter query, pipeline execution, ping)
//! - MongoDB and in-memory implementations
//! - `QueryExecutor`, which runs a `QueryPlan` against a store

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use async_trait::async_trait;
use bson::Document;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::errors::{QueryError, QueryResult};
use crate::query::QueryPlan;

/// Ordered stream of documents produced by a store
pub type DocumentStream = BoxStream<'static, QueryResult<Document>>;

/// Store capability used by the executor
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Filter query in the store's native cursor order, optionally capped
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        limit: Option<u64>,
    ) -> QueryResult<DocumentStream>;

    /// Run pipeline stages in order
    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> QueryResult<DocumentStream>;

    /// Check connectivity
    async fn ping(&self) -> QueryResult<()>;

    /// Store name for logs
    fn name(&self) -> &str;
}

/// Runs query plans against a shared store
#[derive(Clone)]
pub struct QueryExecutor {
    store: Arc<dyn DocumentStore>,
}

impl QueryExecutor {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Execute a plan and buffer the complete result set
    pub async fn execute(&self, collection: &str, plan: &QueryPlan) -> QueryResult<Vec<Document>> {
        match plan {
            QueryPlan::Aggregate { pipeline } => {
                let stages = pipeline
                    .iter()
                    .enumerate()
                    .map(|(index, stage)| to_stage(index, stage))
                    .collect::<QueryResult<Vec<_>>>()?;

                tracing::debug!(store = self.store.name(), collection, "Running aggregation");
                self.store
                    .aggregate(collection, stages)
                    .await?
                    .try_collect()
                    .await
            }
            QueryPlan::Find { filter, limit } => {
                let filter = to_document(filter)?;
                let limit = (*limit > 0).then_some(*limit);

                tracing::debug!(store = self.store.name(), collection, ?limit, "Running find");
                let stream = self.store.find(collection, filter, limit).await?;
                match limit {
                    Some(limit) => {
                        stream
                            .take(usize::try_from(limit).unwrap_or(usize::MAX))
                            .try_collect()
                            .await
                    }
                    None => stream.try_collect().await,
                }
            }
        }
    }
}

/// Convert a JSON mapping to BSON, honoring Extended JSON forms like `{"$oid": ...}`
fn to_document(map: &Map<String, Value>) -> QueryResult<Document> {
    Document::try_from(map.clone())
        .map_err(|e| QueryError::execution(format!("Invalid query document: {}", e)))
}

fn to_stage(index: usize, stage: &Value) -> QueryResult<Document> {
    match stage {
        Value::Object(map) => to_document(map),
        _ => Err(QueryError::execution(format!(
            "Aggregation stage {} is not a document",
            index
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId, Bson};
    use serde_json::json;

    /// Store that ignores the limit it is given
    struct UncappedStore {
        docs: Vec<Document>,
    }

    #[async_trait]
    impl DocumentStore for UncappedStore {
        async fn find(
            &self,
            _collection: &str,
            _filter: Document,
            _limit: Option<u64>,
        ) -> QueryResult<DocumentStream> {
            Ok(futures::stream::iter(self.docs.clone().into_iter().map(Ok)).boxed())
        }

        async fn aggregate(&self, _collection: &str, _pipeline: Vec<Document>) -> QueryResult<DocumentStream> {
            Err(QueryError::execution("aggregation unavailable"))
        }

        async fn ping(&self) -> QueryResult<()> {
            Ok(())
        }

        fn name(&self) -> &str {
            "uncapped"
        }
    }

    fn numbered(count: i32) -> Vec<Document> {
        (0..count).map(|n| doc! { "n": n }).collect()
    }

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_find_caps_stream_even_if_store_does_not() {
        let executor = QueryExecutor::new(Arc::new(UncappedStore { docs: numbered(10) }));
        let plan = QueryPlan::Find {
            filter: Map::new(),
            limit: 3,
        };

        let docs = executor.execute("numbers", &plan).await.unwrap();
        assert_eq!(docs, numbered(3));
    }

    #[tokio::test]
    async fn test_find_without_limit_returns_everything_in_order() {
        let executor = QueryExecutor::new(Arc::new(UncappedStore { docs: numbered(5) }));
        let plan = QueryPlan::Find {
            filter: Map::new(),
            limit: 0,
        };

        let docs = executor.execute("numbers", &plan).await.unwrap();
        assert_eq!(docs, numbered(5));
    }

    #[tokio::test]
    async fn test_store_failure_is_propagated_unmodified() {
        let executor = QueryExecutor::new(Arc::new(UncappedStore { docs: Vec::new() }));
        let plan = QueryPlan::Aggregate {
            pipeline: vec![json!({"$match": {}})],
        };

        let err = executor.execute("numbers", &plan).await.unwrap_err();
        assert_eq!(err, QueryError::execution("aggregation unavailable"));
    }

    #[tokio::test]
    async fn test_non_document_stage_is_rejected() {
        let executor = QueryExecutor::new(Arc::new(MemoryStore::new()));
        let plan = QueryPlan::Aggregate {
            pipeline: vec![json!({"$match": {}}), json!("$limit")],
        };

        let err = executor.execute("numbers", &plan).await.unwrap_err();
        assert_eq!(err.to_string(), "Aggregation stage 1 is not a document");
    }

    #[test]
    fn test_extended_json_becomes_bson_types() {
        let filter = to_document(&object(json!({
            "_id": {"$oid": "507f1f77bcf86cd799439011"},
            "age": {"$gt": 30}
        })))
        .unwrap();

        let expected_id = ObjectId::parse_str("507f1f77bcf86cd799439011").unwrap();
        assert_eq!(filter.get("_id"), Some(&Bson::ObjectId(expected_id)));
        assert_eq!(filter.get_document("age").unwrap(), &doc! { "$gt": 30 });
    }

    #[test]
    fn test_invalid_extended_json_is_an_execution_error() {
        let err = to_document(&object(json!({"_id": {"$oid": "not-hex"}}))).unwrap_err();
        assert!(matches!(err, QueryError::Execution { ref message } if message.starts_with("Invalid query document")));
    }
}
