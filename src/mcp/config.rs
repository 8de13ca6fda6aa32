// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! MCP server configuration.
//!
//! One [`ServerConfig`] describes how to reach a single named tool server.
//! Server definitions live under `mcp_servers` in the secretary config file:
//!
//! ```json
//! {
//!   "mcp_servers": {
//!     "filesystem": {
//!       "transport": "stdio",
//!       "command": "npx",
//!       "args": ["-y", "@modelcontextprotocol/server-filesystem", "/path"],
//!       "auto_connect": true,
//!       "startup_timeout_sec": 30,
//!       "tool_timeout_sec": 300
//!     },
//!     "search": {
//!       "transport": "http",
//!       "url": "http://localhost:8931",
//!       "bearer_token": "${SEARCH_TOKEN}",
//!       "enabled_tools": ["web_search"]
//!     }
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::error::McpError;

/// Configuration for a single MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Transport type.
    #[serde(default)]
    pub transport: TransportType,

    /// Whether this server is registered with the bridge at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Connect during startup instead of lazily on first use.
    #[serde(default)]
    pub auto_connect: bool,

    /// Startup (spawn + handshake) timeout in seconds.
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_sec: u64,

    /// Per-call timeout in seconds.
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_sec: u64,

    /// List of enabled tools (if empty, all tools are enabled).
    #[serde(default)]
    pub enabled_tools: Vec<String>,

    /// List of disabled tools.
    #[serde(default)]
    pub disabled_tools: Vec<String>,

    /// Environment variables for stdio transport.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Working directory for stdio transport.
    #[serde(default)]
    pub cwd: Option<String>,

    /// Command for stdio transport.
    #[serde(default)]
    pub command: Option<String>,

    /// Arguments for stdio transport.
    #[serde(default)]
    pub args: Vec<String>,

    /// Base URL for HTTP transport.
    #[serde(default)]
    pub url: Option<String>,

    /// Bearer token for HTTP transport (supports ${ENV_VAR} expansion).
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// Extra HTTP headers.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_true() -> bool {
    true
}

fn default_startup_timeout() -> u64 {
    30
}

fn default_tool_timeout() -> u64 {
    300
}

impl ServerConfig {
    fn with_transport(transport: TransportType) -> Self {
        Self {
            transport,
            enabled: true,
            auto_connect: false,
            startup_timeout_sec: default_startup_timeout(),
            tool_timeout_sec: default_tool_timeout(),
            enabled_tools: Vec::new(),
            disabled_tools: Vec::new(),
            env: HashMap::new(),
            cwd: None,
            command: None,
            args: Vec::new(),
            url: None,
            bearer_token: None,
            headers: HashMap::new(),
        }
    }

    /// Create a stdio transport configuration.
    pub fn stdio(command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
            ..Self::with_transport(TransportType::Stdio)
        }
    }

    /// Create an HTTP transport configuration.
    pub fn http(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::with_transport(TransportType::Http)
        }
    }

    /// Add command arguments.
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(|s| s.into()).collect();
        self
    }

    /// Set environment variables.
    pub fn with_env(
        mut self,
        env: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        self.env = env
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Set working directory.
    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Set bearer token.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Set enabled tools.
    pub fn with_enabled_tools(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.enabled_tools = tools.into_iter().map(|s| s.into()).collect();
        self
    }

    /// Set disabled tools.
    pub fn with_disabled_tools(
        mut self,
        tools: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.disabled_tools = tools.into_iter().map(|s| s.into()).collect();
        self
    }

    /// Connect at startup.
    pub fn with_auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = auto_connect;
        self
    }

    /// Set the per-call timeout.
    pub fn with_tool_timeout(mut self, secs: u64) -> Self {
        self.tool_timeout_sec = secs;
        self
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_sec)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_sec)
    }

    /// Check if a tool is enabled.
    pub fn is_tool_enabled(&self, tool_name: &str) -> bool {
        if self.disabled_tools.iter().any(|t| t == tool_name) {
            return false;
        }

        self.enabled_tools.is_empty() || self.enabled_tools.iter().any(|t| t == tool_name)
    }

    /// Check that the fields required by the transport are present.
    pub fn validate(&self, name: &str) -> Result<(), McpError> {
        match self.transport {
            TransportType::Stdio if self.command.as_deref().is_none_or(str::is_empty) => Err(
                McpError::Config(format!("server '{}': stdio transport requires 'command'", name)),
            ),
            TransportType::Http if self.url.as_deref().is_none_or(str::is_empty) => Err(
                McpError::Config(format!("server '{}': http transport requires 'url'", name)),
            ),
            _ => Ok(()),
        }
    }

    /// Expand environment variables in bearer token.
    pub fn expanded_bearer_token(&self) -> Option<String> {
        self.bearer_token.as_deref().map(expand_env_vars)
    }
}

/// Replace every `${VAR}` with the variable's value (empty when unset).
///
/// Substituted values are not expanded again.
pub fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            break;
        };
        result.push_str(&rest[..start]);
        let var_name = &rest[start + 2..start + end];
        result.push_str(&std::env::var(var_name).unwrap_or_default());
        rest = &rest[start + end + 1..];
    }
    result.push_str(rest);
    result
}

/// Transport type for MCP connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    /// Newline-delimited JSON-RPC over a child process's stdin/stdout.
    #[default]
    Stdio,

    /// JSON-RPC POSTed to `<url>/rpc`.
    Http,
}

impl std::fmt::Display for TransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Http => write!(f, "http"),
        }
    }
}
