// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! MCP client for a single server.
//!
//! [`McpClient`] owns one [`Transport`], performs the `initialize` handshake,
//! and exposes typed wrappers for the tool, resource and prompt methods.
//! All methods take `&self`, so one client can be shared behind an `Arc` and
//! used by many tasks at once; concurrent calls are multiplexed by the
//! transport.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::config::{ServerConfig, TransportType};
use super::error::McpError;
use super::protocol::error_codes;
use super::transport::{CallOptions, HttpTransport, StdioTransport, Transport};
use super::types::{
    CallToolParams, ClientCapabilities, ConnectionState, GetPromptParams, GetPromptResult,
    Implementation, InitializeParams, InitializeResult, ListPromptsResult,
    ListResourceTemplatesResult, ListResourcesResult, ListToolsResult, McpPrompt, McpResource,
    McpToolInfo, McpToolResult, Paginated, ReadResourceResult, ResourceTemplate,
    ServerCapabilities, PROTOCOL_VERSION,
};

#[cfg(feature = "telemetry")]
use std::time::Instant;

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

/// Client for a single MCP server connection.
pub struct McpClient {
    /// Server name.
    name: String,

    /// Server configuration.
    config: ServerConfig,

    /// Identity sent in `initialize`.
    client_info: Implementation,

    /// Live transport, present only while connected.
    transport: RwLock<Option<Arc<dyn Transport>>>,

    /// Connection state.
    state: RwLock<ConnectionState>,

    /// Handshake result (after initialization).
    init: RwLock<Option<InitializeResult>>,

    /// Last error message.
    last_error: RwLock<Option<String>>,

    /// Serializes connect/disconnect.
    lifecycle: Mutex<()>,
}

impl McpClient {
    /// Create a new MCP client. Nothing is spawned until [`connect`](Self::connect).
    pub fn new(name: impl Into<String>, config: ServerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            client_info: Implementation::new(env!("CARGO_PKG_NAME"), crate::VERSION),
            transport: RwLock::new(None),
            state: RwLock::new(ConnectionState::Disconnected),
            init: RwLock::new(None),
            last_error: RwLock::new(None),
            lifecycle: Mutex::new(()),
        }
    }

    /// Override the identity sent during the handshake.
    pub fn with_client_info(mut self, info: Implementation) -> Self {
        self.client_info = info;
        self
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the connection state.
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Check if the client is ready for calls.
    pub async fn is_ready(&self) -> bool {
        self.state().await == ConnectionState::Ready
    }

    /// Server identity reported in the handshake.
    pub async fn server_info(&self) -> Option<Implementation> {
        self.init.read().await.as_ref().map(|i| i.server_info.clone())
    }

    /// Capabilities reported in the handshake.
    pub async fn capabilities(&self) -> Option<ServerCapabilities> {
        self.init.read().await.as_ref().map(|i| i.capabilities.clone())
    }

    /// Get the last error message.
    pub async fn last_error(&self) -> Option<String> {
        self.last_error.read().await.clone()
    }

    /// Open the configured transport and run the handshake.
    ///
    /// A no-op when already connected.
    pub async fn connect(&self) -> Result<InitializeResult, McpError> {
        let _lifecycle = self.lifecycle.lock().await;
        if let Some(init) = self.ready_init().await {
            return Ok(init);
        }

        if let Err(e) = self.config.validate(&self.name) {
            self.fail(&e).await;
            return Err(e);
        }

        *self.state.write().await = ConnectionState::Connecting;
        let transport: Arc<dyn Transport> = match self.open_transport().await {
            Ok(t) => t,
            Err(e) => {
                self.fail(&e).await;
                return Err(e);
            }
        };

        self.establish(transport).await
    }

    /// Run the handshake over a caller-supplied transport.
    pub async fn connect_with_transport(
        &self,
        transport: Arc<dyn Transport>,
    ) -> Result<InitializeResult, McpError> {
        let _lifecycle = self.lifecycle.lock().await;
        if let Some(init) = self.ready_init().await {
            // Already connected: the new transport is not needed.
            let _ = transport.close().await;
            return Ok(init);
        }
        *self.state.write().await = ConnectionState::Connecting;
        self.establish(transport).await
    }

    async fn ready_init(&self) -> Option<InitializeResult> {
        if self.state().await != ConnectionState::Ready {
            return None;
        }
        self.init.read().await.clone()
    }

    async fn open_transport(&self) -> Result<Arc<dyn Transport>, McpError> {
        match self.config.transport {
            TransportType::Stdio => Ok(Arc::new(StdioTransport::spawn(&self.name, &self.config)?)),
            TransportType::Http => {
                let transport = HttpTransport::new(&self.name, &self.config)?;
                transport.probe_health().await;
                Ok(Arc::new(transport))
            }
        }
    }

    async fn establish(&self, transport: Arc<dyn Transport>) -> Result<InitializeResult, McpError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let result = self.handshake(transport.as_ref()).await;

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("mcp.client.connect", start.elapsed());

        match result {
            Ok(init) => {
                info!(
                    server = %self.name,
                    transport = %transport.kind(),
                    remote = %init.server_info.name,
                    version = %init.server_info.version,
                    "MCP server ready"
                );
                *self.transport.write().await = Some(transport);
                *self.init.write().await = Some(init.clone());
                *self.last_error.write().await = None;
                *self.state.write().await = ConnectionState::Ready;
                Ok(init)
            }
            Err(e) => {
                if let Err(close_err) = transport.close().await {
                    debug!(server = %self.name, "close after failed handshake: {}", close_err);
                }
                self.fail(&e).await;
                Err(e)
            }
        }
    }

    async fn handshake(&self, transport: &dyn Transport) -> Result<InitializeResult, McpError> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: self.client_info.clone(),
        };

        let timeout = self.config.startup_timeout();
        let raw = transport
            .request(
                "initialize",
                Some(serde_json::to_value(params)?),
                CallOptions::with_timeout(timeout),
            )
            .await
            .map_err(|e| McpError::init_failed(&self.name, e.to_string()))?;

        let init: InitializeResult = serde_json::from_value(raw)
            .map_err(|e| McpError::init_failed(&self.name, format!("bad initialize result: {}", e)))?;

        if init.protocol_version != PROTOCOL_VERSION {
            warn!(
                server = %self.name,
                offered = PROTOCOL_VERSION,
                negotiated = %init.protocol_version,
                "server negotiated a different protocol version"
            );
        }

        transport
            .notify("notifications/initialized", None)
            .await
            .map_err(|e| McpError::init_failed(&self.name, e.to_string()))?;

        Ok(init)
    }

    async fn fail(&self, error: &McpError) {
        warn!(server = %self.name, "MCP connection failed: {}", error);
        *self.last_error.write().await = Some(error.to_string());
        *self.state.write().await = ConnectionState::Failed;
    }

    /// Close the connection. Safe to call when not connected.
    pub async fn disconnect(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        let transport = self.transport.write().await.take();
        let Some(transport) = transport else {
            *self.state.write().await = ConnectionState::Disconnected;
            return;
        };

        *self.state.write().await = ConnectionState::Closing;
        if let Err(e) = transport.close().await {
            warn!(server = %self.name, "error closing MCP transport: {}", e);
        }
        *self.init.write().await = None;
        *self.state.write().await = ConnectionState::Disconnected;
        debug!(server = %self.name, "MCP server disconnected");
    }

    async fn live_transport(&self) -> Result<Arc<dyn Transport>, McpError> {
        let transport = self
            .transport
            .read()
            .await
            .clone()
            .ok_or_else(|| McpError::NotConnected(self.name.clone()))?;

        if transport.is_closed() {
            *self.state.write().await = ConnectionState::Failed;
            return Err(McpError::ConnectionClosed(self.name.clone()));
        }
        Ok(transport)
    }

    /// Send a raw request with the configured tool timeout.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        self.call_with(method, params, CallOptions::default()).await
    }

    /// Send a raw request with an explicit deadline or cancellation signal.
    /// A missing timeout falls back to the server's `tool_timeout_sec`.
    pub async fn call_with(
        &self,
        method: &str,
        params: Option<Value>,
        mut options: CallOptions,
    ) -> Result<Value, McpError> {
        let transport = self.live_transport().await?;
        if options.timeout.is_none() {
            options.timeout = Some(self.config.tool_timeout());
        }
        transport.request(method, params, options).await
    }

    /// Send a raw notification.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        self.live_transport().await?.notify(method, params).await
    }

    async fn call_typed<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
        options: CallOptions,
    ) -> Result<T, McpError> {
        let raw = self.call_with(method, params, options).await?;
        serde_json::from_value(raw).map_err(|e| McpError::InvalidResponse(format!("{}: {}", method, e)))
    }

    async fn require(
        &self,
        capability: &str,
        supported: fn(&ServerCapabilities) -> bool,
    ) -> Result<(), McpError> {
        let init = self.init.read().await;
        let caps = init
            .as_ref()
            .map(|i| &i.capabilities)
            .ok_or_else(|| McpError::NotConnected(self.name.clone()))?;
        if supported(caps) {
            Ok(())
        } else {
            Err(McpError::not_supported(&self.name, capability))
        }
    }

    /// Follow `nextCursor` until the server stops returning one.
    async fn paginate<P: Paginated>(&self, method: &str) -> Result<Vec<P::Item>, McpError> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let page: P = self.call_typed(method, params, CallOptions::default()).await?;
            let (page_items, next) = page.into_page();
            items.extend(page_items);

            match next {
                Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
                Some(next) => {
                    warn!(server = %self.name, method, cursor = %next, "server repeated a cursor");
                    break;
                }
                None => break,
            }
        }

        Ok(items)
    }

    /// List the server's tools, minus any filtered out by configuration.
    pub async fn list_tools(&self) -> Result<Vec<McpToolInfo>, McpError> {
        self.require("tools", ServerCapabilities::supports_tools).await?;
        let tools = self.paginate::<ListToolsResult>("tools/list").await?;

        Ok(tools
            .into_iter()
            .filter(|t| self.config.is_tool_enabled(&t.name))
            .map(|t| McpToolInfo {
                server: self.name.clone(),
                ..t
            })
            .collect())
    }

    /// Call a tool on this server.
    pub async fn call_tool(&self, tool: &str, arguments: Value) -> Result<McpToolResult, McpError> {
        self.call_tool_with(tool, arguments, CallOptions::default()).await
    }

    pub async fn call_tool_with(
        &self,
        tool: &str,
        arguments: Value,
        options: CallOptions,
    ) -> Result<McpToolResult, McpError> {
        if !self.config.is_tool_enabled(tool) {
            return Err(McpError::protocol(
                error_codes::TOOL_NOT_FOUND,
                format!("tool '{}' is disabled for server '{}'", tool, self.name),
            ));
        }
        self.require("tools", ServerCapabilities::supports_tools).await?;

        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let params = CallToolParams {
            name: tool.to_string(),
            arguments,
        };
        let result: Result<McpToolResult, McpError> = self
            .call_typed("tools/call", Some(serde_json::to_value(params)?), options)
            .await;

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_tool(
            &format!("mcp.{}.{}", self.name, tool),
            start.elapsed(),
            result.as_ref().is_ok_and(|r| !r.is_error),
        );

        result
    }

    pub async fn list_resources(&self) -> Result<Vec<McpResource>, McpError> {
        self.require("resources", ServerCapabilities::supports_resources).await?;
        self.paginate::<ListResourcesResult>("resources/list").await
    }

    pub async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplate>, McpError> {
        self.require("resources", ServerCapabilities::supports_resources).await?;
        self.paginate::<ListResourceTemplatesResult>("resources/templates/list")
            .await
    }

    /// Read a resource by URI.
    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, McpError> {
        self.require("resources", ServerCapabilities::supports_resources).await?;
        self.call_typed("resources/read", Some(json!({ "uri": uri })), CallOptions::default())
            .await
    }

    pub async fn list_prompts(&self) -> Result<Vec<McpPrompt>, McpError> {
        self.require("prompts", ServerCapabilities::supports_prompts).await?;
        self.paginate::<ListPromptsResult>("prompts/list").await
    }

    /// Render a prompt template with the given arguments.
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: HashMap<String, String>,
    ) -> Result<GetPromptResult, McpError> {
        self.require("prompts", ServerCapabilities::supports_prompts).await?;
        let params = GetPromptParams {
            name: name.to_string(),
            arguments,
        };
        self.call_typed(
            "prompts/get",
            Some(serde_json::to_value(params)?),
            CallOptions::default(),
        )
        .await
    }
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("name", &self.name)
            .field("transport", &self.config.transport)
            .finish_non_exhaustive()
    }
}
