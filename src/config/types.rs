// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration types.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bridge::ToolMapping;
use crate::error::ConfigError;
use crate::mcp::ServerConfig;

/// Top-level secretary configuration, as read from `.secretary.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretaryConfig {
    /// Identity this secretary uses toward other agents.
    pub agent_id: String,

    /// MCP servers by name.
    pub mcp_servers: BTreeMap<String, ServerConfig>,

    pub cache: CacheConfig,

    pub context: ContextConfig,

    /// Query routes, tried in order.
    pub mappings: Vec<ToolMapping>,
}

impl Default for SecretaryConfig {
    fn default() -> Self {
        Self {
            agent_id: "secretary".to_string(),
            mcp_servers: BTreeMap::new(),
            cache: CacheConfig::default(),
            context: ContextConfig::default(),
            mappings: Vec::new(),
        }
    }
}

impl SecretaryConfig {
    /// Servers with `enabled: true`, in name order.
    pub fn enabled_servers(&self) -> impl Iterator<Item = (&String, &ServerConfig)> {
        self.mcp_servers.iter().filter(|(_, config)| config.enabled)
    }

    /// Check server definitions and that every mapping targets a known server.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, server) in self.enabled_servers() {
            server
                .validate(name)
                .map_err(|e| ConfigError::invalid_value(format!("mcp_servers.{}", name), e.to_string()))?;
        }

        for (i, mapping) in self.mappings.iter().enumerate() {
            if !self.mcp_servers.contains_key(&mapping.server) {
                return Err(ConfigError::invalid_value(
                    format!("mappings[{}].server", i),
                    format!("unknown server '{}'", mapping.server),
                ));
            }
            if mapping.tool.is_empty() {
                return Err(ConfigError::invalid_value(
                    format!("mappings[{}].tool", i),
                    "tool name is empty",
                ));
            }
        }
        Ok(())
    }
}

/// Resource cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of cached resource reads. Zero disables expiry.
    pub resource_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            resource_ttl_secs: 300,
        }
    }
}

impl CacheConfig {
    pub fn resource_ttl(&self) -> Duration {
        Duration::from_secs(self.resource_ttl_secs)
    }
}

/// Context store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Entry lifetime when an entry does not set one. Zero keeps entries forever.
    pub default_ttl_secs: u64,

    /// Sweep period. Zero disables the background sweep.
    pub cleanup_interval_secs: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 24 * 60 * 60,
            cleanup_interval_secs: 300,
        }
    }
}

impl ContextConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Option<Duration> {
        (self.cleanup_interval_secs > 0).then(|| Duration::from_secs(self.cleanup_interval_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::ArgumentSource;
    use crate::mcp::TransportType;

    #[test]
    fn test_defaults() {
        let config = SecretaryConfig::default();
        assert_eq!(config.agent_id, "secretary");
        assert_eq!(config.cache.resource_ttl(), Duration::from_secs(300));
        assert_eq!(config.context.default_ttl(), Duration::from_secs(86400));
        assert_eq!(config.context.cleanup_interval(), Some(Duration::from_secs(300)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            "agent_id": "sec-1",
            "mcp_servers": {
                "files": {"transport": "stdio", "command": "mcp-fs", "args": ["/srv"], "auto_connect": true},
                "search": {"transport": "http", "url": "http://localhost:8080"},
                "off": {"command": "x", "enabled": false}
            },
            "cache": {"resource_ttl_secs": 60},
            "context": {"cleanup_interval_secs": 0},
            "mappings": [
                {"pattern": "search", "server": "search", "tool": "web_search",
                 "arguments": {"q": {"from": "query"}}}
            ]
        }"#;

        let config: SecretaryConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.agent_id, "sec-1");
        assert_eq!(config.mcp_servers["search"].transport, TransportType::Http);
        assert_eq!(config.enabled_servers().count(), 2);
        assert_eq!(config.cache.resource_ttl_secs, 60);
        assert_eq!(config.context.default_ttl_secs, 86400);
        assert!(config.context.cleanup_interval().is_none());
        assert_eq!(config.mappings[0].arguments["q"], ArgumentSource::Query);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_mapping_server() {
        let config: SecretaryConfig = serde_json::from_str(
            r#"{"mappings": [{"pattern": "x", "server": "ghost", "tool": "t"}]}"#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("mappings[0].server"));
    }

    #[test]
    fn test_validate_rejects_incomplete_server() {
        let config: SecretaryConfig =
            serde_json::from_str(r#"{"mcp_servers": {"web": {"transport": "http"}}}"#).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
