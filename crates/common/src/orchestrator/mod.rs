//! Query orchestration
//!
//! Sequences one natural-language request end to end:
//! model → extract → parse → interpret → execute → serialize.
//!
//! `run` returns a typed result; `render` is the only place that turns it
//! into user-facing text.

use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::errors::QueryResult;
use crate::llm::{LanguageModel, QUERY_INSTRUCTION};
use crate::metrics::{record_model_request, record_query};
use crate::query::{extract_candidate, interpret, parse_query_spec};
use crate::serializer::{serialize_document, to_json};
use crate::store::{DocumentStore, QueryExecutor};

/// Collection queried when the caller names none
pub const DEFAULT_COLLECTION: &str = "mycollection";

/// Rendered when a query matches nothing
pub const NO_DOCUMENTS: &str = "No documents found.";

/// Prefix of every rendered failure
pub const ERROR_PREFIX: &str = "Error executing MongoDB query: ";

/// Successful outcome of one call
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// Serialized documents in store order; never empty
    Documents(Vec<Value>),
    Empty,
}

impl QueryOutcome {
    pub fn len(&self) -> usize {
        match self {
            QueryOutcome::Documents(docs) => docs.len(),
            QueryOutcome::Empty => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Natural-language query service shared across requests
#[derive(Clone)]
pub struct QueryService {
    model: Arc<dyn LanguageModel>,
    executor: QueryExecutor,
    instruction: Arc<str>,
}

impl QueryService {
    pub fn new(model: Arc<dyn LanguageModel>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            model,
            executor: QueryExecutor::new(store),
            instruction: Arc::from(QUERY_INSTRUCTION),
        }
    }

    /// Replace the fixed instruction sent ahead of every prompt
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Arc::from(instruction.into());
        self
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        self.executor.store()
    }

    pub fn model(&self) -> &Arc<dyn LanguageModel> {
        &self.model
    }

    /// Translate and run one request
    pub async fn run(&self, prompt: &str, collection: &str) -> QueryResult<QueryOutcome> {
        let query_id = Uuid::new_v4();
        let span = tracing::info_span!("nl_query", %query_id, collection);

        async move {
            let start = Instant::now();
            let mut operation = "none";

            let result = self.translate_and_run(prompt, collection, &mut operation).await;
            let duration = start.elapsed().as_secs_f64();

            match &result {
                Ok(outcome) => {
                    let outcome_label = if outcome.is_empty() { "empty" } else { "documents" };
                    tracing::info!(
                        operation,
                        documents = outcome.len(),
                        duration_ms = duration * 1000.0,
                        "Query completed"
                    );
                    record_query(duration, operation, outcome_label, outcome.len());
                }
                Err(e) => {
                    tracing::error!(operation, kind = e.kind(), error = %e, "Query failed");
                    record_query(duration, operation, e.kind(), 0);
                }
            }

            result
        }
        .instrument(span)
        .await
    }

    /// Run and render; never fails
    pub async fn query(&self, prompt: &str, collection: &str) -> String {
        render(&self.run(prompt, collection).await)
    }

    async fn translate_and_run(
        &self,
        prompt: &str,
        collection: &str,
        operation: &mut &'static str,
    ) -> QueryResult<QueryOutcome> {
        let model_start = Instant::now();
        let generated = self.model.generate(&self.instruction, prompt).await;
        record_model_request(
            model_start.elapsed().as_secs_f64(),
            self.model.model_name(),
            generated.is_ok(),
        );
        let raw = generated?;
        tracing::debug!(raw = %raw, "Model raw response");

        let candidate = extract_candidate(&raw);
        let (spec, parsed_with) = parse_query_spec(&candidate)?;
        tracing::info!(parser = parsed_with.as_str(), "Query spec parsed");

        let plan = interpret(&spec)?;
        *operation = plan.operation();

        let docs = self.executor.execute(collection, &plan).await?;
        tracing::info!(count = docs.len(), "Documents fetched");

        let serialized = docs
            .iter()
            .map(|doc| serialize_document(doc).map(to_json))
            .collect::<QueryResult<Vec<_>>>()?;

        if serialized.is_empty() {
            Ok(QueryOutcome::Empty)
        } else {
            Ok(QueryOutcome::Documents(serialized))
        }
    }
}

/// Turn a call result into the text returned to the caller
pub fn render(result: &QueryResult<QueryOutcome>) -> String {
    match result {
        Ok(QueryOutcome::Documents(docs)) => serde_json::to_string(docs)
            .unwrap_or_else(|e| format!("{}{}", ERROR_PREFIX, e)),
        Ok(QueryOutcome::Empty) => NO_DOCUMENTS.to_string(),
        Err(e) => format!("{}{}", ERROR_PREFIX, e),
    }
}
