//! MCP Protocol Implementation
//!
//! JSON-RPC 2.0 envelopes, the shared codec, and the two transports.

pub mod codec;
pub mod http;
pub mod stdio;
pub mod types;
