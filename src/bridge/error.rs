// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Bridge error types.

use std::fmt;

use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::mcp::{error_codes, JsonRpcError, McpError};

use super::types::SyncReport;

/// One failed step of a resource sync.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncFailure {
    pub server: String,
    /// `None` when listing the server's resources failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    pub message: String,
}

impl fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.uri {
            Some(uri) => write!(f, "{} ({}): {}", self.server, uri, self.message),
            None => write!(f, "{}: {}", self.server, self.message),
        }
    }
}

fn join_failures(failures: &[SyncFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors returned by bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// No client registered under this name.
    #[error("No MCP server named '{0}'")]
    ServerNotFound(String),

    #[error("MCP server '{0}' is already registered")]
    AlreadyRegistered(String),

    /// No registered mapping matches the query.
    #[error("No tool mapping matches query '{0}'")]
    NoMapping(String),

    /// The server returned no content for the URI.
    #[error("Resource '{0}' not found")]
    ResourceNotFound(String),

    /// A tool call failed at the transport or protocol level.
    #[error("Tool call {server}/{tool} failed: {source}")]
    ToolCall {
        server: String,
        tool: String,
        #[source]
        source: McpError,
    },

    /// Reading a resource failed.
    #[error("Reading {uri} from '{server}' failed: {source}")]
    Resource {
        server: String,
        uri: String,
        #[source]
        source: McpError,
    },

    /// Connecting to or querying a server failed.
    #[error("MCP server '{server}' failed: {source}")]
    Server {
        server: String,
        #[source]
        source: McpError,
    },

    /// At least one step of a resource sync failed; the rest still ran.
    #[error("Resource sync had {} failure(s): {}", .failures.len(), join_failures(.failures))]
    Sync {
        report: SyncReport,
        failures: Vec<SyncFailure>,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl BridgeError {
    pub fn server(server: impl Into<String>, source: McpError) -> Self {
        Self::Server {
            server: server.into(),
            source,
        }
    }

    /// The underlying client error, if any.
    pub fn mcp_source(&self) -> Option<&McpError> {
        match self {
            Self::ToolCall { source, .. } | Self::Resource { source, .. } | Self::Server { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }

    /// Structured error for protocol peers. Never carries internal traces.
    pub fn to_rpc_error(&self) -> JsonRpcError {
        match self {
            Self::ServerNotFound(server) => {
                JsonRpcError::new(error_codes::INVALID_PARAMS, self.to_string())
                    .with_data(json!({ "server": server }))
            }
            Self::AlreadyRegistered(_) | Self::Config(_) => {
                JsonRpcError::new(error_codes::INVALID_PARAMS, self.to_string())
            }
            Self::NoMapping(query) => JsonRpcError::new(error_codes::TOOL_NOT_FOUND, self.to_string())
                .with_data(json!({ "query": query })),
            Self::ResourceNotFound(uri) => {
                JsonRpcError::new(error_codes::RESOURCE_NOT_FOUND, self.to_string())
                    .with_data(json!({ "uri": uri }))
            }
            Self::ToolCall { server, tool, source } => {
                with_context(source.to_rpc_error(), self, json!({ "server": server, "tool": tool }))
            }
            Self::Resource { server, uri, source } => {
                with_context(source.to_rpc_error(), self, json!({ "server": server, "uri": uri }))
            }
            Self::Server { server, source } => {
                with_context(source.to_rpc_error(), self, json!({ "server": server }))
            }
            Self::Sync { failures, .. } => {
                JsonRpcError::new(error_codes::INTERNAL_ERROR, self.to_string())
                    .with_data(json!({ "failures": failures }))
            }
        }
    }
}

// Keep the server's own error code, but describe it with bridge context.
fn with_context(mut inner: JsonRpcError, outer: &BridgeError, data: serde_json::Value) -> JsonRpcError {
    inner.message = outer.to_string();
    if inner.data.is_none() {
        inner.data = Some(data);
    }
    inner
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BridgeError::NoMapping("what's the weather".into());
        assert_eq!(err.to_string(), "No tool mapping matches query 'what's the weather'");

        let err = BridgeError::ToolCall {
            server: "search".into(),
            tool: "web".into(),
            source: McpError::NotConnected("search".into()),
        };
        assert!(err.to_string().starts_with("Tool call search/web failed"));
        assert!(err.mcp_source().is_some());
    }

    #[test]
    fn test_rpc_error_codes() {
        assert_eq!(
            BridgeError::ResourceNotFound("file:///x".into()).to_rpc_error().code,
            error_codes::RESOURCE_NOT_FOUND
        );
        assert_eq!(
            BridgeError::NoMapping("q".into()).to_rpc_error().code,
            error_codes::TOOL_NOT_FOUND
        );

        let err = BridgeError::ToolCall {
            server: "s".into(),
            tool: "t".into(),
            source: McpError::protocol(error_codes::INVALID_PARAMS, "bad args"),
        };
        let rpc = err.to_rpc_error();
        assert_eq!(rpc.code, error_codes::INVALID_PARAMS);
        assert_eq!(rpc.data.unwrap()["tool"], "t");
    }

    #[test]
    fn test_sync_error_lists_failures() {
        let err = BridgeError::Sync {
            report: SyncReport::default(),
            failures: vec![
                SyncFailure {
                    server: "a".into(),
                    uri: None,
                    message: "down".into(),
                },
                SyncFailure {
                    server: "b".into(),
                    uri: Some("file:///x".into()),
                    message: "gone".into(),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "Resource sync had 2 failure(s): a: down; b (file:///x): gone"
        );
        let rpc = err.to_rpc_error();
        assert_eq!(rpc.data.unwrap()["failures"][1]["uri"], "file:///x");
    }
}
