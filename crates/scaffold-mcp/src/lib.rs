//! scaffold-mcp — MCP server for structured application models.
//!
//! Exposes application-model operations (user stories, forms, reports,
//! workflows) to AI agents over the Model Context Protocol: JSON-RPC 2.0 on
//! a newline-delimited stdio stream, or over HTTP with Server-Sent-Events
//! push for clients that cannot attach to process standard streams.
//!
//! The crate is the protocol core: tool registry, message codec, the two
//! transports, and the dispatcher. Domain tools plug in through
//! [`registry::ToolDefinition`]; the server never special-cases a tool name.

pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod tools;

pub use error::{RegistryError, ServerError, ToolError};
pub use protocol::http::{HttpConfig, HttpTransport};
pub use protocol::stdio::StdioTransport;
pub use protocol::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestId, ServerInfo};
pub use registry::{ToolDefinition, ToolRegistry};
pub use server::McpServer;
