//! Configuration management for QueryForge services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Legacy deployment variables (MONGO_URI, GOOGLE_API_KEY, GEMINI_MODEL)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// MongoDB configuration
    #[serde(default)]
    pub mongo: MongoConfig,

    /// Generative model configuration
    #[serde(default)]
    pub model: ModelConfig,

    /// Query behaviour
    #[serde(default)]
    pub query: QueryConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds (covers the model call and the store round trip)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Serve the MCP tool endpoint at `/mcp`
    #[serde(default = "default_enabled")]
    pub mcp_enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MongoConfig {
    /// Connection string
    #[serde(default = "default_mongo_uri")]
    pub uri: String,

    /// Database holding the queried collections
    #[serde(default = "default_mongo_database")]
    pub database: String,

    /// Application name reported to the server
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Server selection timeout in seconds
    #[serde(default = "default_server_selection_timeout")]
    pub server_selection_timeout_secs: u64,

    /// Maximum pooled connections
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    /// Model provider: gemini, mock
    #[serde(default = "default_model_provider")]
    pub provider: String,

    /// API key for the model service
    pub api_key: Option<String>,

    /// API base URL
    #[serde(default = "default_model_api_base")]
    pub api_base: String,

    /// Model to use
    #[serde(default = "default_model_name")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,

    /// Sampling temperature, provider default when unset
    pub temperature: Option<f32>,

    /// Replaces the built-in query generation instruction
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryConfig {
    /// Collection used when a request names none
    #[serde(default = "default_collection")]
    pub default_collection: String,

    /// Longest accepted prompt, in characters
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Expose Prometheus metrics on /metrics
    #[serde(default = "default_enabled")]
    pub metrics_enabled: bool,

    /// Service name for logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second (global)
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 60 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_mongo_uri() -> String { "mongodb://localhost:27017".to_string() }
fn default_mongo_database() -> String { "sample_mflix".to_string() }
fn default_app_name() -> String { "queryforge".to_string() }
fn default_connect_timeout() -> u64 { 10 }
fn default_server_selection_timeout() -> u64 { 10 }
fn default_max_pool_size() -> u32 { 20 }
fn default_model_provider() -> String { "gemini".to_string() }
fn default_model_api_base() -> String { "https://generativelanguage.googleapis.com/v1beta".to_string() }
fn default_model_name() -> String { crate::DEFAULT_MODEL.to_string() }
fn default_model_timeout() -> u64 { 30 }
fn default_collection() -> String { crate::orchestrator::DEFAULT_COLLECTION.to_string() }
fn default_max_prompt_chars() -> usize { 4000 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_service_name() -> String { "queryforge".to_string() }
fn default_rate_limit() -> u32 { 20 }
fn default_burst() -> u32 { 40 }
fn default_enabled() -> bool { true }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            // Legacy deployment variables, kept for existing .env files
            .set_override_option("mongo.uri", std::env::var("MONGO_URI").ok())?
            .set_override_option("model.api_key", std::env::var("GOOGLE_API_KEY").ok())?
            .set_override_option("model.model", std::env::var("GEMINI_MODEL").ok())?

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            mcp_enabled: default_enabled(),
        }
    }
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: default_mongo_uri(),
            database: default_mongo_database(),
            app_name: default_app_name(),
            connect_timeout_secs: default_connect_timeout(),
            server_selection_timeout_secs: default_server_selection_timeout(),
            max_pool_size: default_max_pool_size(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_model_provider(),
            api_key: None,
            api_base: default_model_api_base(),
            model: default_model_name(),
            timeout_secs: default_model_timeout(),
            temperature: None,
            system_prompt: None,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_collection: default_collection(),
            max_prompt_chars: default_max_prompt_chars(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_enabled: default_enabled(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}
