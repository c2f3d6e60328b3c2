//! Language model abstraction
//!
//! Provides a unified interface for query generation:
//! - Google Gemini (`generateContent`)
//! - Mock model for tests and offline runs

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::ModelConfig;
use crate::errors::{AppError, QueryError, QueryResult, Result};

/// Fixed instruction sent ahead of every user prompt
pub const QUERY_INSTRUCTION: &str = "You are a MongoDB query generator. Given a natural language instruction, \
generate only a valid MongoDB query as a JSON object, not Python. Use double quotes. (no explanations). \
Assume typical document fields like `name`, `age`, `email`, `created_at`, `city`. \
For a simple lookup respond with {\"filter\": {...}, \"limit\": N}; \
for grouping, sorting or computed results respond with {\"aggregate\": [stage, ...]}.";

/// Trait for query generation
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate one text reply for a system instruction and user prompt
    async fn generate(&self, system: &str, prompt: &str) -> QueryResult<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Gemini `generateContent` client
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    system_instruction: GeminiContent,
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

fn text_content(role: Option<&str>, text: &str) -> GeminiContent {
    GeminiContent {
        role: role.map(str::to_string),
        parts: vec![GeminiPart {
            text: Some(text.to_string()),
        }],
    }
}

impl GeminiClient {
    /// Create a new Gemini client
    pub fn new(
        api_key: String,
        model: String,
        base_url: String,
        timeout: Duration,
        temperature: Option<f32>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::ModelClient {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn build_request(&self, system: &str, prompt: &str) -> GeminiRequest {
        GeminiRequest {
            system_instruction: text_content(None, system),
            contents: vec![text_content(Some("user"), prompt)],
            generation_config: self.temperature.map(|temperature| GenerationConfig { temperature }),
        }
    }
}

/// Pull the reply text out of a decoded response
fn response_text(response: GeminiResponse) -> QueryResult<String> {
    let candidate = match response.candidates.into_iter().next() {
        Some(candidate) => candidate,
        None => {
            let reason = response
                .prompt_feedback
                .and_then(|feedback| feedback.block_reason)
                .map(|reason| format!(" (prompt blocked: {})", reason))
                .unwrap_or_default();
            return Err(QueryError::model(format!("Response contained no candidates{}", reason)));
        }
    };

    let text: String = candidate
        .content
        .unwrap_or_default()
        .parts
        .into_iter()
        .filter_map(|part| part.text)
        .collect();

    let text = text.trim();
    if text.is_empty() {
        let reason = candidate
            .finish_reason
            .map(|reason| format!(" (finish reason: {})", reason))
            .unwrap_or_default();
        return Err(QueryError::model(format!("Response contained no text{}", reason)));
    }

    Ok(text.to_string())
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, system: &str, prompt: &str) -> QueryResult<String> {
        let request = self.build_request(system, prompt);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| QueryError::model(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(QueryError::model(format!("{}: {}", status, body)));
        }

        let decoded: GeminiResponse = response
            .json()
            .await
            .map_err(|e| QueryError::model(e.to_string()))?;

        response_text(decoded)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Mock model for testing
pub struct MockModel {
    reply: std::result::Result<String, String>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockModel {
    /// Always answer with `reply`
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: Ok(reply.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always fail with a model error
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            reply: Err(message.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// (system, prompt) pairs received so far
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for MockModel {
    async fn generate(&self, system: &str, prompt: &str) -> QueryResult<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((system.to_string(), prompt.to_string()));
        }

        self.reply.clone().map_err(QueryError::model)
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

/// Create a model client based on configuration
pub fn create_model(config: &ModelConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "gemini" => {
            let api_key = config
                .api_key
                .clone()
                .filter(|key| !key.trim().is_empty())
                .ok_or_else(|| AppError::Configuration {
                    message: "model.api_key is required for the gemini provider".to_string(),
                })?;

            tracing::info!(model = %config.model, "Using Gemini model");
            Ok(Arc::new(GeminiClient::new(
                api_key,
                config.model.clone(),
                config.api_base.clone(),
                Duration::from_secs(config.timeout_secs),
                config.temperature,
            )?))
        }
        "mock" => {
            tracing::warn!("Using mock model, every prompt yields an unfiltered find");
            Ok(Arc::new(MockModel::new(r#"{"filter": {}, "limit": 10}"#)))
        }
        other => Err(AppError::Configuration {
            message: format!("Unknown model provider: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gemini(temperature: Option<f32>) -> GeminiClient {
        GeminiClient::new(
            "test-key".to_string(),
            "gemini-2.0-flash".to_string(),
            "https://generativelanguage.googleapis.com/v1beta/".to_string(),
            Duration::from_secs(5),
            temperature,
        )
        .unwrap()
    }

    #[test]
    fn test_request_shape() {
        let client = gemini(Some(0.0));
        let body = serde_json::to_value(client.build_request("be terse", "people in Boston")).unwrap();

        assert_eq!(
            body,
            json!({
                "systemInstruction": {"parts": [{"text": "be terse"}]},
                "contents": [{"role": "user", "parts": [{"text": "people in Boston"}]}],
                "generationConfig": {"temperature": 0.0}
            })
        );
        assert_eq!(
            client.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn test_request_without_temperature() {
        let body = serde_json::to_value(gemini(None).build_request("s", "p")).unwrap();
        assert!(body.get("generationConfig").is_none());
    }

    #[test]
    fn test_response_text_joins_parts_and_trims() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "  {\"filter\": "}, {"text": "{}}\n"}]},
                "finishReason": "STOP"
            }]
        }))
        .unwrap();

        assert_eq!(response_text(response).unwrap(), "{\"filter\": {}}");
    }

    #[test]
    fn test_blocked_prompt_is_a_model_error() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap();

        let err = response_text(response).unwrap_err();
        assert_eq!(err.kind(), "model_error");
        assert!(err.to_string().contains("prompt blocked: SAFETY"));
    }

    #[test]
    fn test_empty_text_is_a_model_error() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{"finishReason": "MAX_TOKENS"}]
        }))
        .unwrap();

        let err = response_text(response).unwrap_err();
        assert!(err.to_string().contains("finish reason: MAX_TOKENS"));
    }

    #[tokio::test]
    async fn test_mock_model_records_calls() {
        let model = MockModel::new("{}");
        assert_eq!(model.generate(QUERY_INSTRUCTION, "anything").await.unwrap(), "{}");
        assert_eq!(
            model.calls(),
            vec![(QUERY_INSTRUCTION.to_string(), "anything".to_string())]
        );

        let failing = MockModel::failing("quota exhausted");
        assert_eq!(
            failing.generate("s", "p").await.unwrap_err(),
            QueryError::model("quota exhausted")
        );
    }

    #[test]
    fn test_create_model() {
        let mut config = ModelConfig::default();
        config.api_key = None;
        assert!(matches!(
            create_model(&config),
            Err(AppError::Configuration { .. })
        ));

        config.api_key = Some("key".to_string());
        assert_eq!(create_model(&config).unwrap().model_name(), config.model);

        config.provider = "mock".to_string();
        assert_eq!(create_model(&config).unwrap().model_name(), "mock-model");

        config.provider = "llama".to_string();
        assert!(create_model(&config).is_err());
    }
}
