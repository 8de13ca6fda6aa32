// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Agent-facing bridge over MCP servers.
//!
//! The bridge owns a registry of named [`McpClient`](crate::mcp::McpClient)s
//! and turns agent traffic into MCP calls:
//!
//! - free-form queries are routed through an ordered table of
//!   [`ToolMapping`]s into `tools/call` requests, and tool results are
//!   normalized into [`AgentResponse`]s;
//! - resources are read (through a TTL cache) and written into the
//!   [`ContextStore`](crate::context::ContextStore) as context entries;
//! - servers can be discovered and inspected.
//!
//! [`AgentDispatcher`] wraps the bridge with permission checks and audit
//! records for requests coming from other agents.

mod cache;
mod dispatch;
mod error;
mod mapping;
mod service;
mod types;

pub use cache::{CachedResource, ResourceCache, DEFAULT_RESOURCE_TTL};
pub use dispatch::{
    AgentDispatcher, AgentReply, AgentRequest, AllowAll, AuditEventType, AuditRecord, AuditSink,
    MemoryAuditSink, PermissionChecker, TracingAuditSink,
};
pub use error::{BridgeError, SyncFailure};
pub use mapping::{ArgumentSource, MappingTable, ResultHandler, ToolMapping};
pub use service::{McpBridge, RESOURCE_TOPICS};
pub use types::{
    AgentQuery, AgentResponse, BridgeStatus, ServerDiscovery, ServerStatus, SyncReport,
    ToolCallRequest, BASELINE_CONFIDENCE,
};
