// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The MCP bridge: client registry, query translation, resource sync.
//!
//! The bridge never holds its registry lock across a client call. Lookups
//! clone the client's `Arc` out of the map and release the lock first, so
//! a slow server can not stall registration or status reads.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::config::SecretaryConfig;
use crate::context::{ContextEntry, ContextStore, ContextType};
use crate::mcp::{CallOptions, McpClient, ResourceContents, ServerConfig};

use super::cache::{CachedResource, ResourceCache, DEFAULT_RESOURCE_TTL};
use super::error::{BridgeError, SyncFailure};
use super::mapping::{MappingTable, ToolMapping};
use super::types::{
    AgentQuery, AgentResponse, BridgeStatus, ServerDiscovery, ServerStatus, SyncReport,
    ToolCallRequest,
};

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;
#[cfg(feature = "telemetry")]
use std::time::Instant;

/// Topics attached to every entry derived from a resource.
pub const RESOURCE_TOPICS: [&str; 2] = ["mcp", "resource"];

/// Bridge between agents and MCP servers.
pub struct McpBridge {
    clients: RwLock<HashMap<String, Arc<McpClient>>>,
    mappings: RwLock<MappingTable>,
    cache: ResourceCache,
    store: Arc<ContextStore>,
}

impl McpBridge {
    /// Create an empty bridge writing into `store`.
    pub fn new(store: Arc<ContextStore>) -> Self {
        Self::with_cache_ttl(store, DEFAULT_RESOURCE_TTL)
    }

    pub fn with_cache_ttl(store: Arc<ContextStore>, ttl: Duration) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            mappings: RwLock::new(MappingTable::new()),
            cache: ResourceCache::new(ttl),
            store,
        }
    }

    /// Register a client for every enabled server and every configured
    /// mapping. Nothing connects yet; see [`connect_auto`](Self::connect_auto).
    pub fn from_config(config: &SecretaryConfig, store: Arc<ContextStore>) -> Result<Self, BridgeError> {
        config
            .validate()
            .map_err(|e| BridgeError::Config(e.to_string()))?;

        let clients = config
            .enabled_servers()
            .map(|(name, server)| (name.clone(), Arc::new(McpClient::new(name.clone(), server.clone()))))
            .collect();
        let mappings = config.mappings.iter().cloned().collect();

        Ok(Self {
            clients: RwLock::new(clients),
            mappings: RwLock::new(mappings),
            cache: ResourceCache::new(config.cache.resource_ttl()),
            store,
        })
    }

    pub fn store(&self) -> &Arc<ContextStore> {
        &self.store
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    pub async fn add_client(&self, name: impl Into<String>, client: Arc<McpClient>) -> Result<(), BridgeError> {
        let name = name.into();
        let mut clients = self.clients.write().await;
        if clients.contains_key(&name) {
            return Err(BridgeError::AlreadyRegistered(name));
        }
        debug!(server = %name, "registered MCP client");
        clients.insert(name, client);
        Ok(())
    }

    /// Register a new client built from `config`.
    pub async fn add_server(
        &self,
        name: impl Into<String>,
        config: ServerConfig,
    ) -> Result<Arc<McpClient>, BridgeError> {
        let name = name.into();
        config
            .validate(&name)
            .map_err(|e| BridgeError::server(&name, e))?;
        let client = Arc::new(McpClient::new(name.clone(), config));
        self.add_client(name, Arc::clone(&client)).await?;
        Ok(client)
    }

    /// Disconnect a client and drop it from the registry.
    pub async fn remove_client(&self, name: &str) -> Result<Arc<McpClient>, BridgeError> {
        let client = self
            .get_client(name)
            .await
            .ok_or_else(|| BridgeError::ServerNotFound(name.to_string()))?;
        client.disconnect().await;
        self.clients.write().await.remove(name);
        debug!(server = %name, "removed MCP client");
        Ok(client)
    }

    pub async fn get_client(&self, name: &str) -> Option<Arc<McpClient>> {
        self.clients.read().await.get(name).cloned()
    }

    /// Registered server names, sorted.
    pub async fn server_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    async fn snapshot_clients(&self) -> Vec<(String, Arc<McpClient>)> {
        let mut clients: Vec<_> = self
            .clients
            .read()
            .await
            .iter()
            .map(|(name, client)| (name.clone(), Arc::clone(client)))
            .collect();
        clients.sort_by(|a, b| a.0.cmp(&b.0));
        clients
    }

    /// Look up a client, connecting it first if needed.
    async fn ready_client(&self, name: &str) -> Result<Arc<McpClient>, BridgeError> {
        let client = self
            .get_client(name)
            .await
            .ok_or_else(|| BridgeError::ServerNotFound(name.to_string()))?;

        if !client.is_ready().await {
            client.connect().await.map_err(|e| BridgeError::server(name, e))?;
        }
        Ok(client)
    }

    /// Connect every server configured with `auto_connect`. Failures are
    /// logged and reported, never fatal.
    pub async fn connect_auto(&self) -> Vec<(String, Result<(), BridgeError>)> {
        let mut results = Vec::new();
        for (name, client) in self.snapshot_clients().await {
            if !client.config().auto_connect {
                continue;
            }
            let result = client
                .connect()
                .await
                .map(|_| ())
                .map_err(|e| BridgeError::server(&name, e));
            if let Err(e) = &result {
                warn!(server = %name, "auto-connect failed: {}", e);
            }
            results.push((name, result));
        }
        results
    }

    /// Disconnect every client.
    pub async fn shutdown(&self) {
        for (_, client) in self.snapshot_clients().await {
            client.disconnect().await;
        }
        info!("bridge shut down");
    }

    // ------------------------------------------------------------------
    // Query translation
    // ------------------------------------------------------------------

    /// Append a mapping; earlier mappings take precedence.
    pub async fn register_mapping(&self, mapping: ToolMapping) {
        self.mappings.write().await.push(mapping);
    }

    pub async fn clear_mappings(&self) {
        self.mappings.write().await.clear();
    }

    pub async fn mappings(&self) -> Vec<ToolMapping> {
        self.mappings.read().await.iter().cloned().collect()
    }

    /// Resolve a query into a tool call using the first matching mapping.
    pub async fn translate_query_to_tool_call(&self, query: &AgentQuery) -> Result<ToolCallRequest, BridgeError> {
        self.mappings.read().await.translate(query)
    }

    /// Run a tool call and translate its result.
    pub async fn execute_tool_call(&self, request: &ToolCallRequest) -> Result<AgentResponse, BridgeError> {
        self.execute_tool_call_with(request, CallOptions::default()).await
    }

    /// Like [`execute_tool_call`](Self::execute_tool_call) with an explicit
    /// deadline or cancellation signal.
    ///
    /// A result the tool flags as an error is still `Ok`, with zero
    /// confidence. Transport and protocol failures are returned as errors.
    #[instrument(skip(self, request, options), fields(server = %request.server, tool = %request.tool))]
    pub async fn execute_tool_call_with(
        &self,
        request: &ToolCallRequest,
        options: CallOptions,
    ) -> Result<AgentResponse, BridgeError> {
        let client = self.ready_client(&request.server).await?;

        let result = client
            .call_tool_with(&request.tool, request.arguments.clone(), options)
            .await
            .map_err(|source| BridgeError::ToolCall {
                server: request.server.clone(),
                tool: request.tool.clone(),
                source,
            })?;

        let response = match &request.handler {
            Some(handler) => handler.handle(&result),
            None => AgentResponse::from_tool_result(&request.server, &request.tool, &result),
        };
        debug!(success = response.success, confidence = response.confidence, "tool call translated");
        Ok(response)
    }

    /// Translate and execute in one step.
    pub async fn answer_query(&self, query: &AgentQuery) -> Result<AgentResponse, BridgeError> {
        let request = self.translate_query_to_tool_call(query).await?;
        self.execute_tool_call(&request).await
    }

    // ------------------------------------------------------------------
    // Resources
    // ------------------------------------------------------------------

    async fn read_from_server(&self, server: &str, uri: &str) -> Result<Vec<ResourceContents>, BridgeError> {
        let client = self.ready_client(server).await?;
        let result = client
            .read_resource(uri)
            .await
            .map_err(|source| BridgeError::Resource {
                server: server.to_string(),
                uri: uri.to_string(),
                source,
            })?;

        if result.contents.is_empty() {
            return Err(BridgeError::ResourceNotFound(uri.to_string()));
        }
        Ok(result.contents)
    }

    /// Read a resource through the cache: a live cached copy is returned
    /// without contacting the server.
    pub async fn read_resource(&self, server: &str, uri: &str) -> Result<CachedResource, BridgeError> {
        if let Some(cached) = self.cache.get(uri).await {
            return Ok(cached);
        }
        let contents = self.read_from_server(server, uri).await?;
        Ok(self.cache.insert(uri, contents).await)
    }

    /// Read a resource from the server, refresh the cache, and store one
    /// context entry per content block. Returns the new entry ids.
    #[instrument(skip(self))]
    pub async fn fetch_resource_as_context(&self, server: &str, uri: &str) -> Result<Vec<String>, BridgeError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let contents = self.read_from_server(server, uri).await?;
        self.cache.insert(uri, contents.clone()).await;

        let mut ids = Vec::with_capacity(contents.len());
        for block in contents {
            ids.push(self.store.store(resource_entry(server, uri, block)).await);
        }

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("bridge.fetch_resource", start.elapsed());

        debug!(entries = ids.len(), "resource stored as context");
        Ok(ids)
    }

    /// Fetch every resource of every connected server into the context
    /// store. Keeps going past failures and reports them together.
    #[instrument(skip(self))]
    pub async fn sync_all_resources(&self) -> Result<SyncReport, BridgeError> {
        let mut report = SyncReport::default();
        let mut failures = Vec::new();

        for (name, client) in self.snapshot_clients().await {
            if !client.is_ready().await {
                continue;
            }
            report.servers += 1;

            if !client
                .capabilities()
                .await
                .is_some_and(|caps| caps.supports_resources())
            {
                report.skipped.push(name);
                continue;
            }

            let resources = match client.list_resources().await {
                Ok(resources) => resources,
                Err(e) => {
                    warn!(server = %name, "listing resources failed: {}", e);
                    failures.push(SyncFailure {
                        server: name.clone(),
                        uri: None,
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            for resource in resources {
                match self.fetch_resource_as_context(&name, &resource.uri).await {
                    Ok(ids) => {
                        report.resources += 1;
                        report.entries += ids.len();
                    }
                    Err(e) => {
                        warn!(server = %name, uri = %resource.uri, "resource sync failed: {}", e);
                        failures.push(SyncFailure {
                            server: name.clone(),
                            uri: Some(resource.uri),
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        info!(
            servers = report.servers,
            resources = report.resources,
            entries = report.entries,
            failures = failures.len(),
            "resource sync finished"
        );

        if failures.is_empty() {
            Ok(report)
        } else {
            Err(BridgeError::Sync { report, failures })
        }
    }

    /// Live cached copy of a resource, if any.
    pub async fn get_cached_resource(&self, uri: &str) -> Option<CachedResource> {
        self.cache.get(uri).await
    }

    // ------------------------------------------------------------------
    // Discovery and status
    // ------------------------------------------------------------------

    /// Connect if needed and describe what the server offers.
    #[instrument(skip(self))]
    pub async fn discover_server(&self, name: &str) -> Result<ServerDiscovery, BridgeError> {
        let client = self.ready_client(name).await?;
        let init = client.connect().await.map_err(|e| BridgeError::server(name, e))?;
        let caps = &init.capabilities;

        let tools = match caps.supports_tools() {
            true => Some(client.list_tools().await.map_err(|e| BridgeError::server(name, e))?),
            false => None,
        };
        let resources = match caps.supports_resources() {
            true => Some(client.list_resources().await.map_err(|e| BridgeError::server(name, e))?),
            false => None,
        };
        let prompts = match caps.supports_prompts() {
            true => Some(client.list_prompts().await.map_err(|e| BridgeError::server(name, e))?),
            false => None,
        };

        Ok(ServerDiscovery {
            name: name.to_string(),
            server_info: init.server_info.clone(),
            protocol_version: init.protocol_version.clone(),
            capabilities: init.capabilities.clone(),
            instructions: init.instructions.clone(),
            tools,
            resources,
            prompts,
        })
    }

    pub async fn status(&self) -> BridgeStatus {
        let mut servers = Vec::new();
        for (name, client) in self.snapshot_clients().await {
            servers.push(ServerStatus {
                name,
                transport: client.config().transport,
                state: client.state().await,
            });
        }

        BridgeStatus {
            connected_servers: servers
                .iter()
                .filter(|s| s.state == crate::mcp::ConnectionState::Ready)
                .count(),
            servers,
            cached_resources: self.cache.len().await,
            mappings: self.mappings.read().await.len(),
        }
    }
}

impl std::fmt::Debug for McpBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpBridge").finish_non_exhaustive()
    }
}

/// Context entry for one content block of a resource.
fn resource_entry(server: &str, requested_uri: &str, block: ResourceContents) -> ContextEntry {
    let uri = if block.uri.is_empty() {
        requested_uri.to_string()
    } else {
        block.uri.clone()
    };

    let (content, encoding) = match (block.text, block.blob) {
        (Some(text), _) => (text, None),
        (None, Some(blob)) => (blob, Some("base64")),
        (None, None) => (String::new(), None),
    };

    let mut entry = ContextEntry::new(ContextType::Project, format!("mcp:{}", server), content)
        .with_topics(RESOURCE_TOPICS)
        .with_metadata("uri", uri)
        .with_metadata("mimeType", json!(block.mime_type))
        .with_metadata("server", server);
    if let Some(encoding) = encoding {
        entry = entry.with_metadata("encoding", encoding);
    }
    entry
}
