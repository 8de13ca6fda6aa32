// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Entry point for requests arriving from other agents.
//!
//! The bridge performs no authorization and writes no audit trail. The
//! dispatcher sits in front of it: every request is checked against a
//! [`PermissionChecker`] first, and every outcome becomes an [`AuditRecord`]
//! handed to an [`AuditSink`].
//!
//! | Request          | Resource            | Action     |
//! |------------------|---------------------|------------|
//! | `Query`          | `mcp:<server>/<tool>` | `execute` |
//! | `FetchResource`  | the resource URI    | `read`     |
//! | `Discover`       | `mcp:<server>`      | `discover` |

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::mcp::{error_codes, JsonRpcError};

use super::service::McpBridge;
use super::types::{AgentQuery, AgentResponse, ServerDiscovery};

/// External authorization decision.
#[cfg_attr(test, mockall::automock)]
pub trait PermissionChecker: Send + Sync {
    fn check_permission(&self, agent_id: &str, resource: &str, action: &str) -> bool;
}

/// Permits everything. For local use only.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl PermissionChecker for AllowAll {
    fn check_permission(&self, _agent_id: &str, _resource: &str, _action: &str) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    ToolCall,
    ResourceFetch,
    Discovery,
    PermissionDenied,
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ToolCall => "tool_call",
            Self::ResourceFetch => "resource_fetch",
            Self::Discovery => "discovery",
            Self::PermissionDenied => "permission_denied",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub event_type: AuditEventType,
    pub from_agent: String,
    pub to_agent: String,
    pub summary: String,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

/// Receives audit records. Must not block.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// Writes audit records to the `secretary::audit` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) {
        info!(
            target: "secretary::audit",
            event = %record.event_type,
            from = %record.from_agent,
            to = %record.to_agent,
            success = record.success,
            "{}",
            record.summary
        );
    }
}

/// Keeps audit records in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: AuditRecord) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
    }
}

/// A request from another agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentRequest {
    Query(AgentQuery),
    FetchResource { server: String, uri: String },
    Discover { server: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentReply {
    Answer(AgentResponse),
    Context {
        #[serde(rename = "entryIds")]
        entry_ids: Vec<String>,
    },
    Discovery(ServerDiscovery),
}

/// Authorizes, executes and audits agent requests against a bridge.
pub struct AgentDispatcher {
    agent_id: String,
    bridge: Arc<McpBridge>,
    permissions: Arc<dyn PermissionChecker>,
    audit: Arc<dyn AuditSink>,
}

impl AgentDispatcher {
    pub fn new(
        agent_id: impl Into<String>,
        bridge: Arc<McpBridge>,
        permissions: Arc<dyn PermissionChecker>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            bridge,
            permissions,
            audit,
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn bridge(&self) -> &Arc<McpBridge> {
        &self.bridge
    }

    /// Handle one request from `from`.
    ///
    /// Query failures come back as a degraded zero-confidence answer; every
    /// other failure, including a denied permission, is a [`JsonRpcError`].
    pub async fn dispatch(&self, from: &str, request: AgentRequest) -> Result<AgentReply, JsonRpcError> {
        match request {
            AgentRequest::Query(query) => Ok(AgentReply::Answer(self.query(from, query).await?)),
            AgentRequest::FetchResource { server, uri } => {
                self.authorize(from, &uri, "read")?;
                let result = self.bridge.fetch_resource_as_context(&server, &uri).await;
                let summary = match &result {
                    Ok(ids) => format!("fetched {} from {} into {} entries", uri, server, ids.len()),
                    Err(e) => format!("fetch {} from {} failed: {}", uri, server, e),
                };
                self.audit(AuditEventType::ResourceFetch, from, summary, result.is_ok());
                result
                    .map(|entry_ids| AgentReply::Context { entry_ids })
                    .map_err(|e| e.to_rpc_error())
            }
            AgentRequest::Discover { server } => {
                self.authorize(from, &format!("mcp:{}", server), "discover")?;
                let result = self.bridge.discover_server(&server).await;
                let summary = match &result {
                    Ok(d) => format!("discovered {} ({})", server, d.server_info.name),
                    Err(e) => format!("discover {} failed: {}", server, e),
                };
                self.audit(AuditEventType::Discovery, from, summary, result.is_ok());
                result.map(AgentReply::Discovery).map_err(|e| e.to_rpc_error())
            }
        }
    }

    async fn query(&self, from: &str, query: AgentQuery) -> Result<AgentResponse, JsonRpcError> {
        let request = match self.bridge.translate_query_to_tool_call(&query).await {
            Ok(request) => request,
            Err(e) => {
                self.audit(
                    AuditEventType::ToolCall,
                    from,
                    format!("no route for query '{}'", query.query),
                    false,
                );
                return Ok(AgentResponse::failure(e.to_string(), Vec::new()));
            }
        };

        let source = request.source_tag();
        self.authorize(from, &source, "execute")?;

        let response = match self.bridge.execute_tool_call(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(from = %from, tool = %source, "query failed: {}", e);
                AgentResponse::failure(e.to_string(), vec![source.clone()])
            }
        };
        self.audit(
            AuditEventType::ToolCall,
            from,
            format!("{} for query '{}'", source, query.query),
            response.success,
        );
        Ok(response)
    }

    fn authorize(&self, from: &str, resource: &str, action: &str) -> Result<(), JsonRpcError> {
        if self.permissions.check_permission(from, resource, action) {
            return Ok(());
        }
        self.audit(
            AuditEventType::PermissionDenied,
            from,
            format!("{} on {} denied", action, resource),
            false,
        );
        Err(
            JsonRpcError::new(error_codes::PERMISSION_DENIED, format!("Permission denied: {} {}", action, resource))
                .with_data(json!({ "agent": from, "resource": resource, "action": action })),
        )
    }

    fn audit(&self, event_type: AuditEventType, from: &str, summary: String, success: bool) {
        self.audit.record(AuditRecord {
            event_type,
            from_agent: from.to_string(),
            to_agent: self.agent_id.clone(),
            summary,
            success,
            timestamp: Utc::now(),
        });
    }
}

impl std::fmt::Debug for AgentDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentDispatcher")
            .field("agent_id", &self.agent_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::ToolMapping;
    use crate::context::ContextStore;
    use mockall::predicate::eq;

    fn dispatcher(permissions: impl PermissionChecker + 'static) -> (AgentDispatcher, Arc<MemoryAuditSink>) {
        let bridge = Arc::new(McpBridge::new(Arc::new(ContextStore::new())));
        let audit = Arc::new(MemoryAuditSink::new());
        let dispatcher = AgentDispatcher::new("secretary", bridge, Arc::new(permissions), audit.clone());
        (dispatcher, audit)
    }

    #[tokio::test]
    async fn test_denied_fetch() {
        let mut permissions = MockPermissionChecker::new();
        permissions
            .expect_check_permission()
            .with(eq("agent-a"), eq("file:///secret"), eq("read"))
            .times(1)
            .return_const(false);
        let (dispatcher, audit) = dispatcher(permissions);

        let err = dispatcher
            .dispatch(
                "agent-a",
                AgentRequest::FetchResource {
                    server: "fs".into(),
                    uri: "file:///secret".into(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, error_codes::PERMISSION_DENIED);

        let records = audit.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event_type, AuditEventType::PermissionDenied);
        assert_eq!(records[0].to_agent, "secretary");
        assert!(!records[0].success);
    }

    #[tokio::test]
    async fn test_unroutable_query_is_degraded() {
        let mut permissions = MockPermissionChecker::new();
        permissions.expect_check_permission().never();
        let (dispatcher, audit) = dispatcher(permissions);

        let reply = dispatcher
            .dispatch("agent-a", AgentRequest::Query(AgentQuery::new("weather")))
            .await
            .unwrap();
        match reply {
            AgentReply::Answer(response) => {
                assert_eq!(response.confidence, 0.0);
                assert!(!response.success);
            }
            other => panic!("unexpected reply: {:?}", other),
        }
        assert_eq!(audit.records()[0].event_type, AuditEventType::ToolCall);
    }

    #[tokio::test]
    async fn test_failed_tool_call_is_degraded() {
        let mut permissions = MockPermissionChecker::new();
        permissions
            .expect_check_permission()
            .with(eq("agent-a"), eq("mcp:ghost/search"), eq("execute"))
            .return_const(true);
        let (dispatcher, audit) = dispatcher(permissions);
        dispatcher
            .bridge()
            .register_mapping(ToolMapping::new("find", "ghost", "search"))
            .await;

        let reply = dispatcher
            .dispatch("agent-a", AgentRequest::Query(AgentQuery::new("find it")))
            .await
            .unwrap();
        let AgentReply::Answer(response) = reply else {
            panic!("expected an answer");
        };
        assert_eq!(response.confidence, 0.0);
        assert_eq!(response.sources, vec!["mcp:ghost/search".to_string()]);
        assert!(!audit.records()[0].success);
    }

    #[tokio::test]
    async fn test_discover_unknown_server() {
        let (dispatcher, audit) = dispatcher(AllowAll);
        let err = dispatcher
            .dispatch("agent-b", AgentRequest::Discover { server: "ghost".into() })
            .await
            .unwrap_err();
        assert_eq!(err.code, error_codes::INVALID_PARAMS);
        assert_eq!(audit.records()[0].event_type, AuditEventType::Discovery);
    }

    #[test]
    fn test_request_wire_format() {
        let request: AgentRequest =
            serde_json::from_str(r#"{"kind": "fetch_resource", "server": "fs", "uri": "file:///a"}"#).unwrap();
        assert_eq!(
            request,
            AgentRequest::FetchResource {
                server: "fs".into(),
                uri: "file:///a".into()
            }
        );

        let request: AgentRequest = serde_json::from_str(r#"{"kind": "query", "query": "hi"}"#).unwrap();
        assert_eq!(request, AgentRequest::Query(AgentQuery::new("hi")));
    }
}
