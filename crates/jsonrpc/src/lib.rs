//! `scout-jsonrpc` is the wire layer for one-shot MCP probing.
//!
//! It covers exactly what a detection probe needs:
//! - newline-delimited JSON-RPC 2.0 request construction and response validation
//! - a spawned-child pipe transport (`PipeProcess`) with bounded reads, per-read
//!   timeouts, and guaranteed SIGTERM-then-SIGKILL termination
//! - SSE `event: endpoint` discovery parsing for the HTTP transport
//!
//! Design goals:
//! - Low ceremony (`serde_json::Value` based)
//! - Per-message size limits so an unknown process cannot exhaust memory
//!
//! Non-goals:
//! - Long-lived sessions, notifications, or server->client requests
//! - Implementing a JSON-RPC server

use serde_json::{Value, json};

mod process;
mod sse;

pub use process::PipeProcess;
pub use sse::{parse_sse_endpoint, read_sse_endpoint};

/// MCP protocol version sent in `initialize` requests.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// `clientInfo.name` sent in `initialize` requests.
pub const CLIENT_NAME: &str = "mcp-scout";

/// `clientInfo.version` sent in `initialize` requests.
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("protocol error: {0}")]
    Protocol(ProtocolError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProtocolErrorKind {
    /// A read exceeded its deadline.
    Timeout,
    /// The transport was closed (stdin already taken, child gone).
    Closed,
    /// Spawning the child process failed.
    Spawn,
    /// The peer sent an invalid JSON / JSON-RPC message.
    InvalidMessage,
    /// Invalid caller input.
    InvalidInput,
    /// Catch-all for internal invariants.
    Other,
}

#[derive(Debug, Clone)]
pub struct ProtocolError {
    pub kind: ProtocolErrorKind,
    pub message: String,
}

impl ProtocolError {
    pub fn new(kind: ProtocolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.message.fmt(f)
    }
}

impl std::error::Error for ProtocolError {}

impl Error {
    pub fn protocol(kind: ProtocolErrorKind, message: impl Into<String>) -> Self {
        Self::Protocol(ProtocolError::new(kind, message))
    }

    /// Returns true if this error is a read-deadline timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Protocol(err) if err.kind == ProtocolErrorKind::Timeout)
    }
}

#[derive(Debug, Clone)]
pub struct Limits {
    /// Maximum bytes for a single JSON-RPC message (one line).
    pub max_message_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            // Large enough for typical MCP messages, but bounded.
            max_message_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Builds the MCP `initialize` request with the given integer id.
pub fn initialize_request(id: i64) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "initialize",
        "params": {
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": CLIENT_NAME,
                "version": CLIENT_VERSION,
            },
        },
    })
}

/// Builds a JSON-RPC 2.0 request with the given integer id.
pub fn request(id: i64, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    })
}

/// Returns true if `value` is a JSON-RPC 2.0 response: an object with
/// `jsonrpc == "2.0"`, an `id`, and a `result` or `error` member.
///
/// Both `result` and `error` responses count; a server that rejects our
/// `initialize` still speaks the protocol.
pub fn is_jsonrpc_response(value: &Value) -> bool {
    let Value::Object(map) = value else {
        return false;
    };
    if map.get("jsonrpc").and_then(|v| v.as_str()) != Some("2.0") {
        return false;
    }
    if !map.contains_key("id") {
        return false;
    }
    map.contains_key("result") || map.contains_key("error")
}

/// Reads one `\n`-terminated line, refusing to buffer more than `max_bytes`.
///
/// Returns `Ok(None)` on EOF with nothing buffered. The trailing `\n` (and a
/// preceding `\r`, if any) are stripped.
pub async fn read_line_limited<R: tokio::io::AsyncBufRead + Unpin>(
    reader: &mut R,
    max_bytes: usize,
) -> Result<Option<Vec<u8>>, std::io::Error> {
    use tokio::io::AsyncBufReadExt;

    let mut buf = Vec::new();
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if buf.is_empty() {
                return Ok(None);
            }
            break;
        }

        let newline_pos = available.iter().position(|b| *b == b'\n');
        let take = newline_pos
            .map(|idx| idx.saturating_add(1))
            .unwrap_or(available.len());
        if buf.len().saturating_add(take) > max_bytes {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "jsonrpc message too large",
            ));
        }
        buf.extend_from_slice(&available[..take]);
        reader.consume(take);

        if newline_pos.is_some() {
            break;
        }
    }

    if buf.ends_with(b"\n") {
        buf.pop();
        if buf.ends_with(b"\r") {
            buf.pop();
        }
    }

    Ok(Some(buf))
}
