// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Model Context Protocol (MCP) client.
//!
//! Connects to external tool servers and exposes their tools, resources and
//! prompts as typed async calls.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                    McpClient                      │
//! │   handshake · capability gating · pagination      │
//! └────────────────────────┬─────────────────────────┘
//!                          │ Arc<dyn Transport>
//!              ┌───────────┴───────────┐
//!        ┌─────▼─────┐           ┌─────▼─────┐
//!        │   Stdio   │           │   HTTP    │
//!        │ Transport │           │ Transport │
//!        └─────┬─────┘           └─────┬─────┘
//!   pending-call table            POST /rpc
//!   + reader task
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use secretary::mcp::{McpClient, ServerConfig};
//!
//! let client = McpClient::new("filesystem", ServerConfig::stdio("mcp-fs").with_args(["/srv"]));
//! client.connect().await?;
//!
//! for tool in client.list_tools().await? {
//!     println!("{}", tool.source_tag());
//! }
//!
//! let result = client.call_tool("read_file", serde_json::json!({"path": "README.md"})).await?;
//! println!("{}", result.as_text());
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod types;

pub use client::McpClient;
pub use config::{ServerConfig, TransportType};
pub use error::McpError;
pub use protocol::{error_codes, JsonRpcError, RequestId};
pub use transport::{CallOptions, HttpTransport, StdioTransport, Transport};
pub use types::*;
