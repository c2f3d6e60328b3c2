//! MongoDB-backed document store

use async_trait::async_trait;
use bson::{doc, Document};
use futures::{StreamExt, TryStreamExt};
use mongodb::{options::ClientOptions, Client, Database};
use std::time::Duration;
use tracing::info;

use super::{DocumentStore, DocumentStream};
use crate::config::MongoConfig;
use crate::errors::{AppError, QueryError, QueryResult, Result};

/// Connection-pooled MongoDB client bound to one database
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    database: Database,
}

impl MongoStore {
    /// Connect and verify the deployment answers a ping
    pub async fn connect(config: &MongoConfig) -> Result<Self> {
        info!(database = %config.database, "Connecting to MongoDB...");

        let mut options = ClientOptions::parse(&config.uri)
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Invalid MongoDB URI: {}", e),
            })?;
        options.app_name = Some(config.app_name.clone());
        options.connect_timeout = Some(Duration::from_secs(config.connect_timeout_secs));
        options.server_selection_timeout =
            Some(Duration::from_secs(config.server_selection_timeout_secs));
        options.max_pool_size = Some(config.max_pool_size);

        let client = Client::with_options(options).map_err(|e| AppError::DatabaseConnection {
            message: format!("Failed to create client: {}", e),
        })?;

        let store = Self {
            database: client.database(&config.database),
            client,
        };

        store.ping().await.map_err(|e| AppError::DatabaseConnection {
            message: format!("Failed to reach MongoDB: {}", e),
        })?;

        info!("MongoDB connection established");
        Ok(store)
    }

    /// Close pooled connections and end server sessions
    pub async fn shutdown(self) {
        info!("Closing MongoDB connections");
        self.client.shutdown().await;
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        limit: Option<u64>,
    ) -> QueryResult<DocumentStream> {
        let collection = self.database.collection::<Document>(collection);

        let mut action = collection.find(filter);
        if let Some(limit) = limit {
            action = action.limit(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let cursor = action.await?;
        Ok(cursor.map_err(QueryError::from).boxed())
    }

    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> QueryResult<DocumentStream> {
        let cursor = self
            .database
            .collection::<Document>(collection)
            .aggregate(pipeline)
            .await?;

        Ok(cursor.map_err(QueryError::from).boxed())
    }

    async fn ping(&self) -> QueryResult<()> {
        self.database.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "mongodb"
    }
}
