//! JSON-RPC request dispatch over the core: `initialize`, `ping`,
//! `tools/list`, `tools/call`. The transport (stdio, or any other framing) is
//! someone else's concern — this module only turns one `MCPRequest` into one
//! `MCPResponse`.

use crate::cache::{result_cache, spec_store};
use crate::mcp::config::DolexConfig;
use crate::mcp::tools;
use crate::mcp::types::{MCPError, MCPRequest, MCPResponse, RequestId};
use crate::source::manager::{SourceManager, SourceManagerConfig};
use crate::transform::table_state::TransformManager;
use crate::util::operation_log::OperationLog;
use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Everything a tool handler needs, shared across every call for the life of
/// the process.
pub struct ServerState {
    pub config: DolexConfig,
    pub source_manager: SourceManager,
    pub transform_manager: TransformManager,
    pub result_cache: result_cache::ResultCache,
    pub spec_store: spec_store::SpecStore,
    pub operation_log: OperationLog,
    pub start_time: Instant,
}

impl ServerState {
    pub fn new(config: DolexConfig) -> Result<Self> {
        let source_manager = SourceManager::new(SourceManagerConfig {
            registry_path: config.registry_path(),
            sandbox_prefixes: config.storage.sandbox_prefixes.clone(),
            max_query_rows: config.performance.max_query_rows,
            hard_row_cap: config.performance.hard_row_cap,
        });
        Ok(Self {
            result_cache: result_cache::ResultCache::new(config.performance.result_cache_capacity),
            spec_store: spec_store::SpecStore::new(config.performance.spec_cache_capacity),
            transform_manager: TransformManager::new(),
            operation_log: OperationLog::new(),
            source_manager,
            config,
        })
    }
}

/// Dispatches JSON-RPC requests against a `ServerState`.
pub struct MCPServer {
    state: Arc<ServerState>,
}

impl MCPServer {
    pub fn new(state: ServerState) -> Self {
        Self { state: Arc::new(state) }
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    /// Handle one already-deserialized JSON-RPC request.
    pub async fn handle_request(&self, request: MCPRequest) -> MCPResponse {
        let id = request.id.clone();
        match request.method.as_str() {
            "initialize" => self.respond(id, Ok(self.initialize_result())),
            "ping" => self.respond(id, Ok(serde_json::json!({}))),
            "tools/list" => self.respond(id, Ok(serde_json::json!({ "tools": tools::tool_definitions() }))),
            "tools/call" => self.respond(id, self.handle_tool_call(request.params).await),
            other => self.respond(id, Err(MCPError::method_not_found(other))),
        }
    }

    fn initialize_result(&self) -> serde_json::Value {
        serde_json::json!({
            "protocolVersion": self.state.config.mcp.protocol_version,
            "serverInfo": {
                "name": self.state.config.mcp.server_name,
                "version": self.state.config.mcp.server_version,
            },
            "capabilities": { "tools": {} },
        })
    }

    async fn handle_tool_call(&self, params: serde_json::Value) -> Result<serde_json::Value, MCPError> {
        let name = params
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| MCPError::invalid_params("missing \"name\""))?
            .to_string();
        let arguments = params.get("arguments").cloned().unwrap_or(serde_json::json!({}));

        info!(tool = %name, "dispatching tool call");
        let result = tools::dispatch(&self.state, &name, arguments).await;
        if result.is_none() {
            warn!(tool = %name, "unknown tool requested");
        }
        result.ok_or_else(|| MCPError::method_not_found(&name))
    }

    fn respond(&self, id: RequestId, result: Result<serde_json::Value, MCPError>) -> MCPResponse {
        match result {
            Ok(value) => MCPResponse { jsonrpc: "2.0".to_string(), id, result: Some(value), error: None },
            Err(error) => MCPResponse { jsonrpc: "2.0".to_string(), id, result: None, error: Some(error) },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &std::path::Path) -> DolexConfig {
        let mut config = DolexConfig::default();
        config.storage.data_dir = dir.to_string_lossy().to_string();
        config
    }

    #[tokio::test]
    async fn initialize_reports_protocol_version() {
        let dir = tempfile::tempdir().unwrap();
        let server = MCPServer::new(ServerState::new(test_config(dir.path())).unwrap());
        let response = server
            .handle_request(MCPRequest {
                jsonrpc: "2.0".to_string(),
                id: RequestId::Number(1),
                method: "initialize".to_string(),
                params: serde_json::json!({}),
            })
            .await;
        assert!(response.error.is_none());
        assert_eq!(response.result.unwrap()["serverInfo"]["name"], "dolex");
    }

    #[tokio::test]
    async fn unknown_method_reports_method_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let server = MCPServer::new(ServerState::new(test_config(dir.path())).unwrap());
        let response = server
            .handle_request(MCPRequest {
                jsonrpc: "2.0".to_string(),
                id: RequestId::Number(1),
                method: "nonexistent".to_string(),
                params: serde_json::json!({}),
            })
            .await;
        assert!(response.error.is_some());
    }

    #[tokio::test]
    async fn tools_list_is_non_empty() {
        let dir = tempfile::tempdir().unwrap();
        let server = MCPServer::new(ServerState::new(test_config(dir.path())).unwrap());
        let response = server
            .handle_request(MCPRequest {
                jsonrpc: "2.0".to_string(),
                id: RequestId::Number(1),
                method: "tools/list".to_string(),
                params: serde_json::json!({}),
            })
            .await;
        let tools = response.result.unwrap()["tools"].as_array().unwrap().len();
        assert!(tools > 10);
    }
}
