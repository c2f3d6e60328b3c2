//! QueryForge Common Library
//!
//! Shared code for the QueryForge services including:
//! - Natural-language → MongoDB query translation pipeline
//! - Language model client abstraction
//! - Document store abstraction and executor
//! - Result serialization
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod orchestrator;
pub mod query;
pub mod serializer;
pub mod store;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{AppError, QueryError, QueryResult, Result};
pub use llm::LanguageModel;
pub use orchestrator::{render, QueryOutcome, QueryService};
pub use store::DocumentStore;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default Gemini model
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
