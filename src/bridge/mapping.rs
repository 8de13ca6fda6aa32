// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Query-to-tool mappings.
//!
//! A [`ToolMapping`] routes any query containing its pattern
//! (case-insensitively) to one tool on one server. Mappings are kept in a
//! [`MappingTable`] and tried in registration order; the first match wins.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::mcp::McpToolResult;

use super::error::BridgeError;
use super::types::{AgentQuery, AgentResponse, ToolCallRequest};

/// Where a tool argument's value comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "from", rename_all = "lowercase")]
pub enum ArgumentSource {
    /// The full query text.
    Query,
    /// A fixed value.
    Literal { value: Value },
    /// A key of the query's context map. Omitted when the key is missing.
    Context { key: String },
}

/// Custom translation of a tool result into an agent response.
#[derive(Clone)]
pub struct ResultHandler(Arc<dyn Fn(&McpToolResult) -> AgentResponse + Send + Sync>);

impl ResultHandler {
    pub fn new(handler: impl Fn(&McpToolResult) -> AgentResponse + Send + Sync + 'static) -> Self {
        Self(Arc::new(handler))
    }

    pub fn handle(&self, result: &McpToolResult) -> AgentResponse {
        (self.0)(result)
    }
}

impl fmt::Debug for ResultHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResultHandler(..)")
    }
}

/// Route from a query pattern to a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMapping {
    /// Matched as a case-insensitive substring. An empty pattern matches
    /// every query, which makes it a catch-all when registered last.
    pub pattern: String,
    pub server: String,
    pub tool: String,

    /// Argument name to value source. Empty means `{"query": <text>}`.
    #[serde(default)]
    pub arguments: BTreeMap<String, ArgumentSource>,

    #[serde(skip)]
    pub handler: Option<ResultHandler>,
}

impl ToolMapping {
    pub fn new(pattern: impl Into<String>, server: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            server: server.into(),
            tool: tool.into(),
            arguments: BTreeMap::new(),
            handler: None,
        }
    }

    pub fn with_argument(mut self, name: impl Into<String>, source: ArgumentSource) -> Self {
        self.arguments.insert(name.into(), source);
        self
    }

    pub fn with_handler(mut self, handler: ResultHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Case-insensitive substring match.
    pub fn matches(&self, query: &str) -> bool {
        query.to_lowercase().contains(&self.pattern.to_lowercase())
    }

    /// Build the tool's arguments object for a query.
    pub fn build_arguments(&self, query: &AgentQuery) -> Value {
        if self.arguments.is_empty() {
            let mut args = Map::new();
            args.insert("query".to_string(), Value::String(query.query.clone()));
            return Value::Object(args);
        }

        let mut args = Map::new();
        for (name, source) in &self.arguments {
            let value = match source {
                ArgumentSource::Query => Some(Value::String(query.query.clone())),
                ArgumentSource::Literal { value } => Some(value.clone()),
                ArgumentSource::Context { key } => query.context.get(key).cloned(),
            };
            match value {
                Some(value) => {
                    args.insert(name.clone(), value);
                }
                None => debug!(argument = %name, tool = %self.tool, "context value missing, argument omitted"),
            }
        }
        Value::Object(args)
    }

    pub fn to_request(&self, query: &AgentQuery) -> ToolCallRequest {
        ToolCallRequest {
            server: self.server.clone(),
            tool: self.tool.clone(),
            arguments: self.build_arguments(query),
            handler: self.handler.clone(),
        }
    }
}

/// Ordered list of mappings.
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    mappings: Vec<ToolMapping>,
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a mapping after every existing one.
    pub fn push(&mut self, mapping: ToolMapping) {
        self.mappings.push(mapping);
    }

    pub fn clear(&mut self) {
        self.mappings.clear();
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolMapping> {
        self.mappings.iter()
    }

    /// First mapping, in registration order, whose pattern matches.
    pub fn find(&self, query: &str) -> Option<&ToolMapping> {
        self.mappings.iter().find(|m| m.matches(query))
    }

    /// Translate a query into a tool call.
    pub fn translate(&self, query: &AgentQuery) -> Result<ToolCallRequest, BridgeError> {
        self.find(&query.query)
            .map(|m| m.to_request(query))
            .ok_or_else(|| BridgeError::NoMapping(query.query.clone()))
    }
}

impl FromIterator<ToolMapping> for MappingTable {
    fn from_iter<I: IntoIterator<Item = ToolMapping>>(iter: I) -> Self {
        Self {
            mappings: iter.into_iter().collect(),
        }
    }
}
