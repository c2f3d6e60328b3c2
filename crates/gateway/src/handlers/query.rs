//! Natural-language query handler

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use validator::{Validate, ValidationError};

use crate::AppState;
use queryforge_common::errors::{AppError, Result};

/// Longest collection name accepted, in bytes
const MAX_COLLECTION_NAME_BYTES: usize = 120;

/// Query request
#[derive(Debug, Deserialize, Validate)]
pub struct QueryRequest {
    #[validate(length(min = 1, message = "prompt must not be empty"))]
    pub prompt: String,

    /// Falls back to `query.default_collection`
    #[serde(default)]
    #[validate(custom(function = "validate_collection_name"))]
    pub collection_name: Option<String>,
}

/// Query response; failures of the query itself are rendered into `result`
#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub result: String,
}

fn validate_collection_name(name: &str) -> std::result::Result<(), ValidationError> {
    let reason = if name.is_empty() {
        "collection name must not be empty"
    } else if name.len() > MAX_COLLECTION_NAME_BYTES {
        "collection name is too long"
    } else if name.contains('$') || name.contains('\0') {
        "collection name must not contain '$' or NUL"
    } else if name.starts_with("system.") {
        "system collections cannot be queried"
    } else {
        return Ok(());
    };

    Err(ValidationError::new("collection_name").with_message(reason.into()))
}

/// Field rules plus the prompt size limit, shared with the MCP tool
pub fn check_request(request: &QueryRequest, max_prompt_chars: usize) -> Result<()> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: e.field_errors().keys().next().map(|field| field.to_string()),
    })?;

    let size = request.prompt.chars().count();
    if size > max_prompt_chars {
        return Err(AppError::PayloadTooLarge {
            size,
            limit: max_prompt_chars,
        });
    }

    Ok(())
}

/// Translate a prompt into a MongoDB query and run it
pub async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>> {
    let start = Instant::now();

    check_request(&request, state.config.query.max_prompt_chars)?;

    let collection = request
        .collection_name
        .as_deref()
        .unwrap_or(state.config.query.default_collection.as_str());

    let result = state.service.query(&request.prompt, collection).await;

    tracing::info!(
        collection = %collection,
        prompt_chars = request.prompt.chars().count(),
        latency_ms = start.elapsed().as_millis() as u64,
        "Query request served"
    );

    Ok(Json(QueryResponse { result }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_state;

    fn request(prompt: &str, collection: Option<&str>) -> Json<QueryRequest> {
        Json(QueryRequest {
            prompt: prompt.to_string(),
            collection_name: collection.map(str::to_string),
        })
    }

    #[test]
    fn test_collection_name_rules() {
        assert!(validate_collection_name("users").is_ok());
        assert!(validate_collection_name("").is_err());
        assert!(validate_collection_name("a$b").is_err());
        assert!(validate_collection_name("a\0b").is_err());
        assert!(validate_collection_name("system.users").is_err());
        assert!(validate_collection_name(&"c".repeat(121)).is_err());
        assert!(validate_collection_name(&"c".repeat(120)).is_ok());
    }

    #[tokio::test]
    async fn test_query_uses_named_collection() {
        let state = test_state(r#"{"filter": {"city": "Boston"}}"#);
        let Json(body) = query(State(state), request("people in Boston", Some("users")))
            .await
            .unwrap();

        assert_eq!(body.result, r#"[{"_id":1,"name":"Alice","city":"Boston"}]"#);
    }

    #[tokio::test]
    async fn test_default_collection_is_used() {
        let state = test_state("{}");
        let Json(body) = query(State(state), request("everything", None)).await.unwrap();
        assert_eq!(body.result, "No documents found.");
    }

    #[tokio::test]
    async fn test_pipeline_failure_is_still_ok() {
        let state = test_state(r#"{"aggregate": []}"#);
        let Json(body) = query(State(state), request("anything", Some("users")))
            .await
            .unwrap();
        assert_eq!(body.result, "Error executing MongoDB query: Aggregation pipeline is empty.");
    }

    #[tokio::test]
    async fn test_empty_prompt_is_rejected() {
        let err = query(State(test_state("{}")), request("", None)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { field: Some(ref f), .. } if f == "prompt"));
    }

    #[tokio::test]
    async fn test_bad_collection_is_rejected() {
        let err = query(State(test_state("{}")), request("x", Some("system.profile")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { field: Some(ref f), .. } if f == "collection_name"));
    }

    #[tokio::test]
    async fn test_long_prompt_is_too_large() {
        let state = test_state("{}");
        let limit = state.config.query.max_prompt_chars;
        let err = query(State(state), request(&"a".repeat(limit + 1), None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge { size, .. } if size == limit + 1));
    }
}
