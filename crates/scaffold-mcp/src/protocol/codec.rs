//! Message codec: JSON-RPC envelope decode/encode plus newline framing.
//!
//! Shared by both transports. A decode failure is data, not a crash: it maps
//! to a `-32700`/`-32600` response (with whatever id could be recovered) and
//! the transport keeps reading.

use serde_json::Value;
use tracing::error;

use super::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestId};

/// Emitted when even the error response fails to serialize, so a client is
/// never left hanging on a silent drop.
const FALLBACK_ERROR_LINE: &str =
    r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"Internal error"}}"#;

/// Why a line failed to decode into a request.
#[derive(Debug)]
pub enum DecodeError {
    /// Not valid JSON at all. No id is recoverable.
    Parse(String),
    /// Valid JSON, but not a JSON-RPC 2.0 request. The id is echoed back when
    /// the malformed envelope still carried a usable one.
    InvalidRequest {
        id: Option<RequestId>,
        detail: String,
    },
}

impl DecodeError {
    /// Convert into the error response the client should receive.
    pub fn into_response(self) -> JsonRpcResponse {
        match self {
            Self::Parse(detail) => JsonRpcResponse::error(None, JsonRpcError::parse_error(detail)),
            Self::InvalidRequest { id, detail } => {
                JsonRpcResponse::error(id, JsonRpcError::invalid_request(detail))
            }
        }
    }
}

/// Decode one line into a JSON-RPC request.
pub fn decode_request(line: &str) -> Result<JsonRpcRequest, DecodeError> {
    let value: Value = serde_json::from_str(line).map_err(|e| DecodeError::Parse(e.to_string()))?;

    // Recover the id before shape validation so even a malformed envelope
    // gets a correlated error response.
    let recovered_id = value
        .get("id")
        .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok());

    let request: JsonRpcRequest =
        serde_json::from_value(value).map_err(|e| DecodeError::InvalidRequest {
            id: recovered_id.clone(),
            detail: e.to_string(),
        })?;

    if request.jsonrpc != super::types::JSONRPC_VERSION {
        return Err(DecodeError::InvalidRequest {
            id: recovered_id,
            detail: format!("unsupported jsonrpc version '{}'", request.jsonrpc),
        });
    }

    Ok(request)
}

/// Serialize a response to a single line (no trailing newline, no embedded
/// newlines — serde_json compact form never emits them).
pub fn encode_response(response: &JsonRpcResponse) -> String {
    serde_json::to_string(response).unwrap_or_else(|e| {
        error!("Failed to serialize response: {}", e);
        FALLBACK_ERROR_LINE.to_string()
    })
}

/// Serialize a server-initiated notification to a single line.
pub fn encode_notification(notification: &JsonRpcRequest) -> String {
    serde_json::to_string(notification).unwrap_or_else(|e| {
        error!("Failed to serialize notification: {}", e);
        FALLBACK_ERROR_LINE.to_string()
    })
}

/// Reassembles newline-delimited messages from arbitrarily chunked bytes.
///
/// Bytes arrive in whatever sizes the OS delivers; complete lines come out.
/// A partial trailing line is retained across `extend` calls, empty lines are
/// skipped, and a trailing `\r` (CRLF clients) is stripped.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a freshly read chunk.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pop the next complete, non-empty line, if one is buffered.
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let pos = self.buf.iter().position(|&b| b == b'\n')?;
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop(); // the '\n'
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if line.is_empty() {
                continue;
            }
            return Some(String::from_utf8_lossy(&line).into_owned());
        }
    }

    /// Bytes of an incomplete trailing line still held.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
