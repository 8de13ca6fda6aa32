// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Secretary - MCP bridge and context store for an autonomous agent.
//!
//! The secretary sits between other agents and a set of MCP (Model Context
//! Protocol) servers. It turns free-form agent queries into tool calls,
//! pulls server resources into an indexed, expiring context store, and
//! reports what each server offers.
//!
//! # Architecture
//!
//! - [`mcp`] - JSON-RPC 2.0 client for MCP servers over stdio or HTTP
//! - [`bridge`] - client registry, query-to-tool translation, resource sync,
//!   and the permission/audit dispatcher for remote agents
//! - [`context`] - in-memory context store with secondary indexes and TTL expiry
//! - [`config`] - configuration file loading
//! - [`telemetry`] - tracing setup and in-process metrics
//! - [`error`] - configuration errors and result aliases
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use secretary::bridge::{AgentQuery, McpBridge, ToolMapping};
//! use secretary::context::ContextStore;
//! use secretary::mcp::ServerConfig;
//!
//! let bridge = McpBridge::new(Arc::new(ContextStore::new()));
//! bridge.add_server("search", ServerConfig::http("http://localhost:8080")).await?;
//! bridge.register_mapping(ToolMapping::new("search", "search", "web_search")).await;
//!
//! let answer = bridge.answer_query(&AgentQuery::new("search rust async")).await?;
//! println!("{} ({:.2})", answer.answer, answer.confidence);
//! ```

pub mod bridge;
pub mod config;
pub mod context;
pub mod error;
pub mod mcp;
pub mod telemetry;

/// Crate version, sent as `clientInfo.version` during the MCP handshake.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use bridge::{AgentDispatcher, AgentQuery, AgentResponse, BridgeError, McpBridge, ToolMapping};
pub use config::{load_config, SecretaryConfig};
pub use context::{ContextEntry, ContextError, ContextQuery, ContextStore, ContextType};
pub use error::{ConfigError, Result};
pub use mcp::{McpClient, McpError, ServerConfig, TransportType};
