//! QueryForge API Gateway
//!
//! The HTTP surface of the natural-language query service.
//! Handles:
//! - Request validation
//! - Rate limiting
//! - Request routing, plus the MCP tool endpoint
//! - Observability (logging, metrics)

mod handlers;
mod mcp;
mod middleware;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use queryforge_common::{
    config::{AppConfig, ObservabilityConfig},
    llm::create_model,
    metrics::{self, LATENCY_BUCKETS, METRICS_PREFIX, MODEL_BUCKETS},
    store::MongoStore,
    QueryService,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub service: QueryService,
    pub metrics: Option<PrometheusHandle>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = match std::env::var("APP_CONFIG_FILE") {
        Ok(path) => AppConfig::from_file(&path),
        Err(_) => AppConfig::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            init_tracing(&ObservabilityConfig::default());
            tracing::error!(error = %e, "Failed to load configuration");
            return Err(e.into());
        }
    };

    init_tracing(&config.observability);
    info!("Starting QueryForge API Gateway v{}", queryforge_common::VERSION);

    let config = Arc::new(config);

    // Initialize metrics
    let metrics_handle = if config.observability.metrics_enabled {
        metrics::register_metrics();
        Some(install_prometheus()?)
    } else {
        None
    };

    // Initialize the document store and model
    let mongo = MongoStore::connect(&config.mongo).await?;
    let model = create_model(&config.model)?;

    let mut service = QueryService::new(model, Arc::new(mongo.clone()));
    if let Some(instruction) = &config.model.system_prompt {
        service = service.with_instruction(instruction.clone());
    }

    // Create app state
    let state = AppState {
        config: config.clone(),
        service,
        metrics: metrics_handle,
    };

    // Build the router
    let app = create_router(state)?;

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if tokio::time::timeout(config.shutdown_timeout(), mongo.shutdown())
        .await
        .is_err()
    {
        tracing::warn!("Timed out closing MongoDB connections");
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Install the tracing subscriber; `RUST_LOG` overrides the configured level
fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Install the Prometheus recorder with fixed histogram buckets
fn install_prometheus() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_request_duration_seconds", METRICS_PREFIX)),
            LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_query_duration_seconds", METRICS_PREFIX)),
            LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_model_duration_seconds", METRICS_PREFIX)),
            MODEL_BUCKETS,
        )?
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    Ok(handle)
}

/// Create the main application router
fn create_router(state: AppState) -> anyhow::Result<Router> {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes
    let mut api_routes = Router::new().route("/query", post(handlers::query::query));

    if state.config.rate_limit.enabled {
        let rate_limit = middleware::rate_limit::create_rate_limiter(
            state.config.rate_limit.requests_per_second,
            state.config.rate_limit.burst,
        )?;
        api_routes = api_routes.layer(axum::middleware::from_fn_with_state(
            rate_limit,
            middleware::rate_limit::rate_limit_middleware,
        ));
    }

    let request_timeout = state.config.request_timeout();

    // Compose the app
    let mut app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route("/metrics", get(handlers::health::metrics))
        .nest("/v1", api_routes)
        .layer(axum::middleware::from_fn(middleware::metrics::track_metrics))
        .layer(TimeoutLayer::new(request_timeout));

    // Mounted outside the timeout so SSE streams stay open
    if state.config.server.mcp_enabled {
        app = app.nest_service("/mcp", mcp::create_mcp_service(&state));
    }

    Ok(app
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state))
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

/// State backed by the mock model and an in-memory `users` collection
#[cfg(test)]
pub(crate) fn test_state(reply: &str) -> AppState {
    use bson::doc;
    use queryforge_common::{llm::MockModel, store::MemoryStore};

    let store = MemoryStore::new().with_collection(
        "users",
        vec![
            doc! { "_id": 1, "name": "Alice", "city": "Boston" },
            doc! { "_id": 2, "name": "Bob", "city": "Austin" },
        ],
    );

    AppState {
        config: Arc::new(AppConfig::default()),
        service: QueryService::new(Arc::new(MockModel::new(reply)), Arc::new(store)),
        metrics: None,
    }
}
