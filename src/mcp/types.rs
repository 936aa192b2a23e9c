//! JSON-RPC envelope types shared by every tool call (spec §A.6).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MCPRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MCPResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<MCPError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(u64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MCPError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Tool definition surfaced by `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Resource definition, reserved for a future `resources/list` — no tool
/// currently publishes one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDefinition {
    pub uri: String,
    pub name: String,
    pub description: String,
    pub mime_type: Option<String>,
}

pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    pub const UNKNOWN_SOURCE: i32 = -32001;
    pub const UNKNOWN_TABLE: i32 = -32002;
    pub const VALIDATION_ERROR: i32 = -32003;
    pub const BACKEND_ERROR: i32 = -32004;
}

impl MCPError {
    pub fn parse_error(message: &str) -> Self {
        Self { code: error_codes::PARSE_ERROR, message: message.to_string(), data: None }
    }

    pub fn invalid_request(message: &str) -> Self {
        Self { code: error_codes::INVALID_REQUEST, message: message.to_string(), data: None }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self { code: error_codes::METHOD_NOT_FOUND, message: format!("Method '{method}' not found"), data: None }
    }

    pub fn invalid_params(message: &str) -> Self {
        Self { code: error_codes::INVALID_PARAMS, message: message.to_string(), data: None }
    }

    pub fn internal_error(message: &str) -> Self {
        Self { code: error_codes::INTERNAL_ERROR, message: message.to_string(), data: None }
    }

    pub fn unknown_source(id_or_name: &str) -> Self {
        Self { code: error_codes::UNKNOWN_SOURCE, message: format!("unknown source: {id_or_name}"), data: None }
    }

    pub fn validation_error(message: &str) -> Self {
        Self { code: error_codes::VALIDATION_ERROR, message: message.to_string(), data: None }
    }

    pub fn backend_error(message: &str) -> Self {
        Self { code: error_codes::BACKEND_ERROR, message: message.to_string(), data: None }
    }
}
