// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! JSON-RPC 2.0 envelope types used by every MCP transport.
//!
//! Messages on the wire are one of three shapes: a request (has `id` and
//! `method`), a notification (has `method`, no `id`), or a response (has `id`
//! and exactly one of `result` / `error`). [`JsonRpcMessage`] classifies an
//! incoming line without committing to a shape up front.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC protocol version string.
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC and MCP-specific error codes.
pub mod error_codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i32 = -32700;
    /// The JSON sent is not a valid request object.
    pub const INVALID_REQUEST: i32 = -32600;
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i32 = -32603;

    /// Caller is not allowed to perform the operation.
    pub const PERMISSION_DENIED: i32 = -32001;
    /// Requested resource URI is unknown to the server.
    pub const RESOURCE_NOT_FOUND: i32 = -32002;
    /// Requested tool is unknown to the server.
    pub const TOOL_NOT_FOUND: i32 = -32003;
    /// Requested prompt is unknown to the server.
    pub const PROMPT_NOT_FOUND: i32 = -32004;
}

/// Correlation id of a request.
///
/// The protocol allows both numbers and strings; this client only generates
/// numbers but matches whatever the server echoes back exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(u64),
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        Self::Number(id)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self::String(id.to_string())
    }
}

/// An outgoing (or server-initiated) request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// A message that expects no response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// Structured error object carried in a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
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

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            error_codes::METHOD_NOT_FOUND,
            format!("Method not found: {}", method),
        )
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// A response to a request, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: RequestId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Split the response into its result or error. A response with neither
    /// is treated as a `null` result.
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Any message that can arrive on a connection.
#[derive(Debug, Clone)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    Response(JsonRpcResponse),
}

impl JsonRpcMessage {
    /// Classify a raw JSON value by which fields are present.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let has_id = value.get("id").is_some_and(|id| !id.is_null());
        let has_method = value.get("method").is_some();

        if has_method && has_id {
            serde_json::from_value(value).map(Self::Request)
        } else if has_method {
            serde_json::from_value(value).map(Self::Notification)
        } else {
            serde_json::from_value(value).map(Self::Response)
        }
    }

    /// Parse a single newline-delimited frame.
    pub fn parse_line(line: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(line)?;
        Self::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let req = JsonRpcRequest::new(7, "tools/list", None);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["id"], 7);
        assert_eq!(json["method"], "tools/list");
        assert!(json.get("params").is_none());
    }

    #[test]
    fn test_notification_has_no_id() {
        let note = JsonRpcNotification::new("notifications/initialized", None);
        let json = serde_json::to_value(&note).unwrap();
        assert!(json.get("id").is_none());
    }

    #[test]
    fn test_classify_messages() {
        let resp = JsonRpcMessage::parse_line(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#).unwrap();
        assert!(matches!(resp, JsonRpcMessage::Response(_)));

        let note =
            JsonRpcMessage::parse_line(r#"{"jsonrpc":"2.0","method":"notifications/progress"}"#)
                .unwrap();
        assert!(matches!(note, JsonRpcMessage::Notification(_)));

        let req =
            JsonRpcMessage::parse_line(r#"{"jsonrpc":"2.0","id":"abc","method":"ping"}"#).unwrap();
        match req {
            JsonRpcMessage::Request(r) => assert_eq!(r.id, RequestId::String("abc".into())),
            other => panic!("expected request, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(JsonRpcMessage::parse_line("not json").is_err());
        assert!(JsonRpcMessage::parse_line(r#"{"jsonrpc":"2.0"}"#).is_err());
    }

    #[test]
    fn test_response_into_result() {
        let ok = JsonRpcResponse::success(RequestId::Number(1), json!({"a": 1}));
        assert_eq!(ok.into_result().unwrap()["a"], 1);

        let err = JsonRpcResponse::failure(
            RequestId::Number(2),
            JsonRpcError::new(error_codes::INVALID_PARAMS, "bad"),
        );
        let e = err.into_result().unwrap_err();
        assert_eq!(e.code, -32602);
        assert_eq!(e.to_string(), "bad (code -32602)");
    }

    #[test]
    fn test_request_id_untagged() {
        let n: RequestId = serde_json::from_value(json!(42)).unwrap();
        assert_eq!(n, RequestId::Number(42));
        let s: RequestId = serde_json::from_value(json!("req-1")).unwrap();
        assert_eq!(s, RequestId::String("req-1".into()));
    }
}
