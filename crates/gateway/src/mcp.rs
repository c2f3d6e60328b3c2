//! MCP tool surface
//!
//! Exposes the query pipeline as the `query_mongodb_nl` tool over the
//! streamable HTTP transport, mounted at `/mcp`.

use rmcp::{
    handler::server::{router::tool::ToolRouter, tool::ToolCallContext, wrapper::Parameters},
    model::{
        CallToolRequestParam, CallToolResult, ListToolsResult, PaginatedRequestParam,
        ServerCapabilities, ServerInfo,
    },
    schemars,
    service::{RequestContext, RoleServer},
    tool, tool_router,
    transport::streamable_http_server::{
        session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
    },
    ErrorData, ServerHandler,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::handlers::query::{check_request, QueryRequest};
use crate::AppState;
use queryforge_common::QueryService;

/// Arguments of `query_mongodb_nl`
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct QueryToolRequest {
    #[schemars(description = "Natural language description of the data to fetch")]
    pub prompt: String,

    #[schemars(description = "Collection to query; defaults to the configured collection")]
    #[serde(default)]
    pub collection_name: Option<String>,
}

/// MCP server wrapping the shared `QueryService`
#[derive(Clone)]
pub struct QueryForgeMcp {
    service: QueryService,
    default_collection: String,
    max_prompt_chars: usize,
    tool_router: ToolRouter<Self>,
}

impl QueryForgeMcp {
    pub fn new(state: &AppState) -> Self {
        Self {
            service: state.service.clone(),
            default_collection: state.config.query.default_collection.clone(),
            max_prompt_chars: state.config.query.max_prompt_chars,
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router]
impl QueryForgeMcp {
    #[tool(description = "Takes a natural language prompt, generates a MongoDB query, and runs it.")]
    async fn query_mongodb_nl(
        &self,
        Parameters(req): Parameters<QueryToolRequest>,
    ) -> Result<String, String> {
        let request = QueryRequest {
            prompt: req.prompt,
            collection_name: req.collection_name,
        };
        check_request(&request, self.max_prompt_chars).map_err(|e| e.to_string())?;

        let collection = request
            .collection_name
            .as_deref()
            .unwrap_or(self.default_collection.as_str());

        tracing::info!(collection = %collection, "MCP query tool called");
        Ok(self.service.query(&request.prompt, collection).await)
    }
}

impl ServerHandler for QueryForgeMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: rmcp::model::Implementation {
                name: "queryforge".into(),
                title: Some("QueryForge natural-language MongoDB queries".into()),
                version: env!("CARGO_PKG_VERSION").into(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Call query_mongodb_nl with a prompt describing the documents you want.".into(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, ErrorData>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult {
            tools: self.tool_router.list_all(),
            next_cursor: None,
            meta: None,
        }))
    }

    fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, ErrorData>> + Send + '_ {
        async move {
            let ctx = ToolCallContext::new(self, request, context);
            self.tool_router.call(ctx).await
        }
    }
}

/// Streamable HTTP service; one `QueryForgeMcp` per session
pub fn create_mcp_service(state: &AppState) -> StreamableHttpService<QueryForgeMcp, LocalSessionManager> {
    let server = QueryForgeMcp::new(state);

    StreamableHttpService::new(
        move || Ok(server.clone()),
        Arc::new(LocalSessionManager::default()),
        StreamableHttpServerConfig {
            sse_keep_alive: Some(Duration::from_secs(15)),
            stateful_mode: true,
            ..Default::default()
        },
    )
}
