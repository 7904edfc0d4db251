//! MCP JSON-RPC Types
//!
//! Core types for the JSON-RPC 2.0 envelopes used by MCP. Shared by both
//! transports; the dispatcher consumes and produces these exclusively.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// MCP protocol version advertised by this server.
pub const MCP_VERSION: &str = "2025-03-26";

/// JSON-RPC version literal.
pub const JSONRPC_VERSION: &str = "2.0";

// ============================================================================
// REQUEST ID
// ============================================================================

/// JSON-RPC request id — string or number.
///
/// Kept as a dedicated enum (not a raw `Value`) so the JSON type a client sent
/// round-trips exactly: a numeric id never comes back as a string and vice
/// versa.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => write!(f, "{}", s),
            Self::Number(n) => write!(f, "{}", n),
        }
    }
}

// ============================================================================
// JSON-RPC REQUEST/RESPONSE
// ============================================================================

/// JSON-RPC Request. An absent `id` marks a notification: no response is
/// expected or produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Build a server-initiated notification (no id).
    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.into(),
            params: Some(params),
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// JSON-RPC Response: exactly one of `result` / `error` is set.
///
/// The `id` field always serializes, as `null` when no id could be recovered
/// from the request (parse errors).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<RequestId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

// ============================================================================
// JSON-RPC ERROR
// ============================================================================

/// JSON-RPC Error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    // Standard JSON-RPC 2.0 reserved codes. These five are a fixed contract
    // and are never repurposed.
    pub fn parse_error(detail: impl Into<String>) -> Self {
        Self::new(-32700, "Parse error").with_data(Value::String(detail.into()))
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::new(-32600, msg)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(-32601, format!("Method not found: {}", method))
    }

    pub fn tool_not_found(name: &str) -> Self {
        Self::new(-32601, format!("Tool not found: {}", name))
            .with_data(serde_json::json!({ "tool": name }))
    }

    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::new(-32602, msg)
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::new(-32603, msg)
    }
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcError {}

// ============================================================================
// MCP PAYLOADS
// ============================================================================

/// Server identity reported in `initialize`, `mcp/ready` and discovery
/// endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// Server capabilities advertised during the handshake.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// `initialize` result payload. The `tools` field must match `tools/list`
/// exactly — clients use either interchangeably depending on the negotiated
/// protocol version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    pub server_info: ServerInfo,
    pub tools: Vec<ToolInfo>,
}

/// Advertised tool metadata, as returned by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// `tools/call` / `mcp/execute` params. The legacy framing used `parameters`
/// where the canonical method uses `arguments`; both are accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
    #[serde(default)]
    pub parameters: Option<Value>,
}

impl CallToolParams {
    /// Effective arguments: canonical field wins, legacy field is the
    /// fallback, absent means an empty object.
    pub fn into_arguments(self) -> Value {
        self.arguments
            .or(self.parameters)
            .unwrap_or_else(|| serde_json::json!({}))
    }
}

// ============================================================================
// TESTS
// ============================================================================
