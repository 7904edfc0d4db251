//! Error types for the scaffold MCP server.
//!
//! Uses `thiserror` for ergonomic error definitions. Protocol-facing errors
//! carry their JSON-RPC 2.0 error code so the dispatcher can map any failure
//! to a well-formed error response.

use thiserror::Error;

/// Top-level server error. Fatal variants end transport startup; everything
/// else is converted to a JSON-RPC error response long before it gets here.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no free port in {attempts} attempts starting at {host}:{start_port}")]
    Bind {
        host: String,
        start_port: u16,
        attempts: u16,
    },

    #[error("invalid listen address {addr}: {detail}")]
    InvalidAddress { addr: String, detail: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Tool registry errors. Registration happens once at startup, so these
/// surface as process-fatal configuration mistakes rather than request errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("tool '{0}' is already registered")]
    Duplicate(String),
}

/// Failure returned by a tool handler.
///
/// Handlers are external collaborators; the dispatcher catches every variant
/// and maps it to a JSON-RPC error without letting it reach the transport.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The caller's arguments failed the tool's own validation.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// The tool started executing and failed.
    #[error("{0}")]
    Failed(String),
}

impl ToolError {
    /// JSON-RPC 2.0 error code for this failure.
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidParams(_) => -32602,
            Self::Failed(_) => -32603,
        }
    }
}
