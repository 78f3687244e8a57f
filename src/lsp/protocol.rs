//! JSON-RPC protocol handling for LSP
//!
//! Implements the JSON-RPC 2.0 message format used by LSP, including the
//! Content-Length header framing for stdio transport and the
//! `$/cancelRequest` notification used to abandon in-flight requests.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};

/// JSON-RPC version constant
pub const JSONRPC_VERSION: &str = "2.0";

/// Method name for cancelling an in-flight request.
pub const CANCEL_REQUEST: &str = "$/cancelRequest";

/// Frame a message body with the Content-Length header.
fn frame(body: String) -> Vec<u8> {
    format!("Content-Length: {}\r\n\r\n{}", body.len(), body).into_bytes()
}

/// JSON-RPC request message
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: i64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    pub fn new(id: i64, method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.into(),
            params,
        }
    }

    /// Encode request to LSP wire format with Content-Length header
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        Ok(frame(serde_json::to_string(self)?))
    }
}

/// JSON-RPC notification (no id, no response expected)
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params,
        }
    }

    /// The `$/cancelRequest` notification for a previously issued request id.
    pub fn cancel(id: i64) -> Self {
        Self::new(CANCEL_REQUEST, Some(serde_json::json!({ "id": id })))
    }

    /// Encode notification to LSP wire format with Content-Length header
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        Ok(frame(serde_json::to_string(self)?))
    }
}

/// JSON-RPC response (incoming from server)
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<i64>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Get the result, or error if present
    pub fn into_result(self) -> Result<serde_json::Value, JsonRpcError> {
        if let Some(error) = self.error {
            Err(error)
        } else {
            Ok(self.result.unwrap_or(serde_json::Value::Null))
        }
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcError {}

/// JSON-RPC response (outgoing to server - for responding to server requests)
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponseOut {
    pub jsonrpc: &'static str,
    pub id: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl JsonRpcResponseOut {
    /// Create a success response
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(result),
        }
    }

    /// Create a success response with null result
    pub fn success_null(id: serde_json::Value) -> Self {
        Self::success(id, serde_json::Value::Null)
    }

    /// Encode response to LSP wire format with Content-Length header
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        Ok(frame(serde_json::to_string(self)?))
    }
}

/// Standard JSON-RPC error codes
#[allow(dead_code)]
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    // LSP-specific error codes
    pub const SERVER_NOT_INITIALIZED: i32 = -32002;
    pub const UNKNOWN_ERROR_CODE: i32 = -32001;
    pub const REQUEST_CANCELLED: i32 = -32800;
    pub const CONTENT_MODIFIED: i32 = -32801;
}

/// Atomic ID generator for JSON-RPC requests
pub struct IdGenerator(AtomicI64);

impl IdGenerator {
    pub fn new() -> Self {
        Self(AtomicI64::new(1))
    }

    pub fn next(&self) -> i64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse Content-Length from an LSP header line, if it is one.
pub fn content_length(line: &str) -> Option<usize> {
    let line = line.trim();
    let (name, value) = line.split_once(':')?;
    if name.eq_ignore_ascii_case("content-length") {
        value.trim().parse().ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_request_encode() {
        let req = JsonRpcRequest::new(1, "initialize", Some(serde_json::json!({"foo": "bar"})));
        let encoded = String::from_utf8(req.encode().unwrap()).unwrap();

        assert!(encoded.starts_with("Content-Length:"));
        assert!(encoded.contains("\r\n\r\n"));
        assert!(encoded.contains("\"jsonrpc\":\"2.0\""));
        assert!(encoded.contains("\"id\":1"));
        assert!(encoded.contains("\"method\":\"initialize\""));
    }

    #[test]
    fn test_notification_encode() {
        let notif = JsonRpcNotification::new("initialized", None);
        let encoded = String::from_utf8(notif.encode().unwrap()).unwrap();

        assert!(encoded.starts_with("Content-Length:"));
        assert!(encoded.contains("\"method\":\"initialized\""));
        // Notifications carry no id
        assert!(!encoded.contains("\"id\":"));
    }

    #[test]
    fn test_cancel_notification() {
        let notif = JsonRpcNotification::cancel(42);
        assert_eq!(notif.method, CANCEL_REQUEST);
        assert_eq!(notif.params, Some(serde_json::json!({ "id": 42 })));
    }

    #[test]
    fn test_frame_length_matches_body() {
        let req = JsonRpcRequest::new(7, "shutdown", None);
        let encoded = String::from_utf8(req.encode().unwrap()).unwrap();
        let (header, body) = encoded.split_once("\r\n\r\n").unwrap();
        let declared: usize = header
            .strip_prefix("Content-Length: ")
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(declared, body.len());
    }

    #[test]
    fn test_id_generator() {
        let gen = IdGenerator::new();
        assert_eq!(gen.next(), 1);
        assert_eq!(gen.next(), 2);
        assert_eq!(gen.next(), 3);
    }

    #[test]
    fn test_content_length() {
        assert_eq!(content_length("Content-Length: 123"), Some(123));
        assert_eq!(content_length("content-length: 456\r\n"), Some(456));
        assert_eq!(content_length("Content-Type: application/json"), None);
        assert_eq!(content_length("garbage"), None);
    }

    #[test]
    fn test_response_into_result() {
        let success = JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: Some(1),
            result: Some(serde_json::json!({"data": "test"})),
            error: None,
        };
        assert!(success.into_result().is_ok());

        let error = JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: Some(1),
            result: None,
            error: Some(JsonRpcError {
                code: error_codes::REQUEST_CANCELLED,
                message: "cancelled".into(),
                data: None,
            }),
        };
        let err = error.into_result().unwrap_err();
        assert_eq!(err.code, -32800);
    }
}
