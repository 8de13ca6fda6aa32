// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Requests and responses exchanged with the bridge.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::mcp::{
    source_tag, ConnectionState, Implementation, McpPrompt, McpResource, McpToolInfo,
    McpToolResult, ServerCapabilities, TransportType,
};

use super::mapping::ResultHandler;

/// Confidence assigned to a successful tool answer.
pub const BASELINE_CONFIDENCE: f32 = 0.85;

/// A free-form question from an agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentQuery {
    pub query: String,

    /// Extra named values that mappings can feed into tool arguments.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, Value>,
}

impl AgentQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            context: HashMap::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// A resolved tool invocation.
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub server: String,
    pub tool: String,
    pub arguments: Value,

    /// Custom translation of the result; the default joins text blocks.
    pub handler: Option<ResultHandler>,
}

impl ToolCallRequest {
    pub fn new(server: impl Into<String>, tool: impl Into<String>, arguments: Value) -> Self {
        Self {
            server: server.into(),
            tool: tool.into(),
            arguments,
            handler: None,
        }
    }

    pub fn source_tag(&self) -> String {
        source_tag(&self.server, &self.tool)
    }
}

/// Normalized answer handed back to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub answer: String,
    pub confidence: f32,
    #[serde(default)]
    pub sources: Vec<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl AgentResponse {
    /// Default translation of a tool result.
    ///
    /// Text blocks are joined with newlines. A result flagged `isError`
    /// yields a zero-confidence answer that says the tool failed.
    pub fn from_tool_result(server: &str, tool: &str, result: &McpToolResult) -> Self {
        let text = result.as_text();
        let metadata = HashMap::from([
            ("server".to_string(), json!(server)),
            ("tool".to_string(), json!(tool)),
        ]);

        if result.is_error {
            let answer = if text.is_empty() {
                format!("Tool {}/{} reported an error", server, tool)
            } else {
                format!("Tool {}/{} reported an error: {}", server, tool, text)
            };
            return Self {
                answer,
                confidence: 0.0,
                sources: vec![source_tag(server, tool)],
                success: false,
                metadata,
            };
        }

        Self {
            answer: text,
            confidence: BASELINE_CONFIDENCE,
            sources: vec![source_tag(server, tool)],
            success: true,
            metadata,
        }
    }

    /// A degraded answer for a request that could not be served.
    pub fn failure(message: impl Into<String>, sources: Vec<String>) -> Self {
        Self {
            answer: message.into(),
            confidence: 0.0,
            sources,
            success: false,
            metadata: HashMap::new(),
        }
    }
}

/// What a server offers, as seen by [`discover_server`](super::McpBridge::discover_server).
///
/// Each listing is `None` when the server did not advertise that capability.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerDiscovery {
    pub name: String,
    pub server_info: Implementation,
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<McpToolInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<McpResource>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<Vec<McpPrompt>>,
}

/// Outcome of a resource sync.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Connected servers visited.
    pub servers: usize,
    /// Resources fetched successfully.
    pub resources: usize,
    /// Context entries written.
    pub entries: usize,
    /// Servers skipped because they do not offer resources.
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerStatus {
    pub name: String,
    pub transport: TransportType,
    pub state: ConnectionState,
}

/// Read-only snapshot of the bridge.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStatus {
    pub connected_servers: usize,
    /// Sorted by name.
    pub servers: Vec<ServerStatus>,
    pub cached_resources: usize,
    pub mappings: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::McpContent;

    #[test]
    fn test_successful_result_joins_text() {
        let result = McpToolResult {
            content: vec![McpContent::text("A"), McpContent::text("B")],
            is_error: false,
        };
        let response = AgentResponse::from_tool_result("srv", "search", &result);

        assert_eq!(response.answer, "A\nB");
        assert_eq!(response.confidence, BASELINE_CONFIDENCE);
        assert_eq!(response.sources, vec!["mcp:srv/search".to_string()]);
        assert!(response.success);
        assert_eq!(response.metadata["tool"], "search");
    }

    #[test]
    fn test_error_result_has_zero_confidence() {
        let response =
            AgentResponse::from_tool_result("srv", "search", &McpToolResult::error("quota exceeded"));
        assert_eq!(response.confidence, 0.0);
        assert!(!response.success);
        assert!(response.answer.contains("quota exceeded"));
    }

    #[test]
    fn test_query_context_builder() {
        let query = AgentQuery::new("read the file").with_context("path", "src/lib.rs");
        assert_eq!(query.context["path"], "src/lib.rs");

        let parsed: AgentQuery = serde_json::from_str(r#"{"query": "hi"}"#).unwrap();
        assert!(parsed.context.is_empty());
    }

    #[test]
    fn test_failure_response() {
        let response = AgentResponse::failure("no route", vec![]);
        assert_eq!(response.confidence, 0.0);
        assert!(!response.success);
    }
}
