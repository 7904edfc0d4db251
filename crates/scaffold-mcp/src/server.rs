//! MCP Server Core
//!
//! The dispatcher / protocol state machine. Validates envelopes, routes the
//! handshake methods, resolves `tools/call` against the registry, and maps
//! every outcome — including handler failures — to a JSON-RPC response.
//!
//! One `McpServer` is shared by all transports of a process; it holds no
//! per-connection state beyond the initialized flag, so concurrent in-flight
//! requests dispatch through `&self` with no cross-request serialization.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::protocol::types::{
    CallToolParams, InitializeResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    MCP_VERSION, ServerCapabilities, ServerInfo, ToolsCapability,
};
use crate::registry::ToolRegistry;

/// MCP server dispatcher. Dependencies are passed in at construction so tests
/// build as many independent instances as they like.
pub struct McpServer {
    registry: Arc<ToolRegistry>,
    info: ServerInfo,
    initialized: AtomicBool,
}

impl McpServer {
    pub fn new(registry: Arc<ToolRegistry>, info: ServerInfo) -> Self {
        Self {
            registry,
            info,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Whether an `initialize` request has been seen.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Relaxed)
    }

    /// Handle an incoming JSON-RPC request. Returns `None` for notifications,
    /// which expect no response.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!("Handling request: {}", request.method);

        // `initialize` is the one method where a response is mandatory, so a
        // missing id is an invalid request rather than a notification.
        if request.method == "initialize" && request.is_notification() {
            warn!("initialize without an id");
            return Some(JsonRpcResponse::error(
                None,
                JsonRpcError::invalid_request("initialize requires an id"),
            ));
        }

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(),
            "notifications/initialized" => return None,
            "tools/list" => self.handle_tools_list(),
            // `mcp/execute` is the legacy framing of `tools/call`; same
            // semantics, kept for clients that predate the rename.
            "tools/call" | "mcp/execute" => self.handle_tools_call(request.params.clone()).await,
            "shutdown" => self.handle_shutdown(),
            "ping" => Ok(serde_json::json!({})),
            method => {
                warn!("Unknown method: {}", method);
                Err(JsonRpcError::method_not_found(method))
            }
        };

        if request.is_notification() {
            // Executed for its side effects; nowhere to send the outcome.
            if let Err(e) = result {
                debug!("Notification '{}' failed: {}", request.method, e);
            }
            return None;
        }

        Some(match result {
            Ok(result) => JsonRpcResponse::success(request.id, result),
            Err(error) => JsonRpcResponse::error(request.id, error),
        })
    }

    /// The advertised capability set. Static for now — tool registration is
    /// closed after startup, so `listChanged` is false.
    pub fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: Some(ToolsCapability {
                list_changed: Some(false),
            }),
        }
    }

    /// Payload for the handshake, mirrored verbatim by `GET /mcp` and the
    /// stdio `mcp/ready` notification.
    pub fn initialize_result(&self) -> InitializeResult {
        InitializeResult {
            protocol_version: MCP_VERSION.to_string(),
            capabilities: self.capabilities(),
            server_info: self.info.clone(),
            tools: self.registry.list(),
        }
    }

    fn handle_initialize(&self) -> Result<Value, JsonRpcError> {
        // Repeats are tolerated: some clients re-send initialize after a
        // transport hiccup, and rejecting them gains nothing.
        if self.initialized.swap(true, Ordering::Relaxed) {
            debug!("initialize repeated; answering again");
        } else {
            info!("MCP session initialized (protocol {})", MCP_VERSION);
        }

        serde_json::to_value(self.initialize_result())
            .map_err(|e| JsonRpcError::internal_error(e.to_string()))
    }

    fn handle_tools_list(&self) -> Result<Value, JsonRpcError> {
        Ok(serde_json::json!({ "tools": self.registry.list() }))
    }

    async fn handle_tools_call(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: CallToolParams = match params {
            Some(p) => serde_json::from_value(p)
                .map_err(|e| JsonRpcError::invalid_params(e.to_string()))?,
            None => return Err(JsonRpcError::invalid_params("Missing tool call parameters")),
        };

        let Some(tool) = self.registry.resolve(&params.name) else {
            warn!("Call to unregistered tool: {}", params.name);
            return Err(JsonRpcError::tool_not_found(&params.name));
        };

        let name = params.name.clone();
        let arguments = params.into_arguments();

        // The single place a handler failure is guaranteed to be intercepted:
        // whatever the tool signals comes back as an error response, never as
        // a dropped connection.
        match tool.invoke(arguments).await {
            Ok(result) => Ok(result),
            Err(failure) => {
                warn!("Tool '{}' failed: {}", name, failure);
                Err(JsonRpcError::new(failure.code(), failure.to_string())
                    .with_data(serde_json::json!({ "tool": name })))
            }
        }
    }

    fn handle_shutdown(&self) -> Result<Value, JsonRpcError> {
        // Protocol-level acknowledgment only. The caller decides whether to
        // close the connection afterwards; transports tear down on their own
        // signals (EOF, disconnect, SIGTERM).
        info!("shutdown acknowledged");
        Ok(Value::Null)
    }
}
