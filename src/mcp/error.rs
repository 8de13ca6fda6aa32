// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! MCP error types.

use thiserror::Error;

use super::protocol::{error_codes, JsonRpcError};

/// Errors that can occur during MCP operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// Spawning the server process or reaching its endpoint failed.
    #[error("Failed to connect to MCP server '{server}': {message}")]
    ConnectionFailed { server: String, message: String },

    /// Handshake did not complete.
    #[error("Failed to initialize MCP server '{server}': {message}")]
    InitializationFailed { server: String, message: String },

    /// Transport-level failure after the connection was established.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The connection was closed while a call was outstanding or before it was issued.
    #[error("Connection to MCP server '{0}' is closed")]
    ConnectionClosed(String),

    /// Server not ready (never connected, or disconnected).
    #[error("MCP server '{0}' is not connected")]
    NotConnected(String),

    /// The server did not advertise the capability the operation needs.
    #[error("MCP server '{server}' does not support {capability}")]
    NotSupported { server: String, capability: String },

    /// The server answered with a JSON-RPC error object.
    #[error("Protocol error: code={code}, message={message}")]
    Protocol {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// A message could not be understood.
    #[error("Invalid response from MCP server: {0}")]
    InvalidResponse(String),

    /// The call deadline elapsed before a response arrived.
    #[error("Call '{method}' timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },

    /// The caller cancelled the call.
    #[error("Call '{0}' was cancelled")]
    Cancelled(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl McpError {
    /// Create a connection failed error.
    pub fn connection_failed(server: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            server: server.into(),
            message: message.into(),
        }
    }

    /// Create an initialization failed error.
    pub fn init_failed(server: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InitializationFailed {
            server: server.into(),
            message: message.into(),
        }
    }

    /// Create a protocol error.
    pub fn protocol(code: i32, message: impl Into<String>) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create a capability error.
    pub fn not_supported(server: impl Into<String>, capability: impl Into<String>) -> Self {
        Self::NotSupported {
            server: server.into(),
            capability: capability.into(),
        }
    }

    /// True for deadline and cancellation failures.
    pub fn is_timeout_or_cancelled(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Cancelled(_))
    }

    /// True when the server reported that the requested tool, resource or prompt does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Protocol { code, .. } if matches!(
                *code,
                error_codes::RESOURCE_NOT_FOUND
                    | error_codes::TOOL_NOT_FOUND
                    | error_codes::PROMPT_NOT_FOUND
            )
        )
    }

    /// Convert into the structured error object exposed to protocol peers.
    pub fn to_rpc_error(&self) -> JsonRpcError {
        match self {
            Self::Protocol {
                code,
                message,
                data,
            } => JsonRpcError {
                code: *code,
                message: message.clone(),
                data: data.clone(),
            },
            Self::NotSupported { .. } => {
                JsonRpcError::new(error_codes::METHOD_NOT_FOUND, self.to_string())
            }
            Self::InvalidResponse(_) | Self::Json(_) => {
                JsonRpcError::new(error_codes::PARSE_ERROR, self.to_string())
            }
            _ => JsonRpcError::new(error_codes::INTERNAL_ERROR, self.to_string()),
        }
    }
}

impl From<JsonRpcError> for McpError {
    fn from(err: JsonRpcError) -> Self {
        Self::Protocol {
            code: err.code,
            message: err.message,
            data: err.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = McpError::NotConnected("test_server".to_string());
        assert!(err.to_string().contains("test_server"));

        let err = McpError::protocol(-32600, "Invalid Request");
        assert!(err.to_string().contains("-32600"));
        assert!(err.to_string().contains("Invalid Request"));

        let err = McpError::not_supported("docs", "prompts");
        assert_eq!(err.to_string(), "MCP server 'docs' does not support prompts");
    }

    #[test]
    fn test_error_helpers() {
        let err = McpError::connection_failed("server", "connection refused");
        assert!(matches!(err, McpError::ConnectionFailed { .. }));

        let err = McpError::init_failed("server", "handshake failed");
        assert!(matches!(err, McpError::InitializationFailed { .. }));

        let err = McpError::Timeout {
            method: "tools/call".into(),
            timeout_ms: 10,
        };
        assert!(err.is_timeout_or_cancelled());
        assert!(McpError::Cancelled("x".into()).is_timeout_or_cancelled());
    }

    #[test]
    fn test_not_found_codes() {
        assert!(McpError::protocol(error_codes::RESOURCE_NOT_FOUND, "gone").is_not_found());
        assert!(McpError::protocol(error_codes::TOOL_NOT_FOUND, "gone").is_not_found());
        assert!(!McpError::protocol(error_codes::INTERNAL_ERROR, "boom").is_not_found());
    }

    #[test]
    fn test_rpc_error_roundtrip() {
        let rpc = JsonRpcError::new(error_codes::PROMPT_NOT_FOUND, "no such prompt")
            .with_data(serde_json::json!({"name": "x"}));
        let err: McpError = rpc.clone().into();
        assert_eq!(err.to_rpc_error(), rpc);

        let err = McpError::Cancelled("tools/call".into());
        assert_eq!(err.to_rpc_error().code, error_codes::INTERNAL_ERROR);
    }
}
