// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Crate-level error types.
//!
//! Each subsystem owns its error enum (`McpError`, `ContextError`,
//! `BridgeError`); this module holds configuration errors and the `anyhow`
//! result alias used by the binary and glue code.

use thiserror::Error;

pub use crate::bridge::BridgeError;
pub use crate::context::ContextError;
pub use crate::mcp::McpError;

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid config format: {0}")]
    InvalidFormat(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),
}

impl ConfigError {
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert!(matches!(ConfigError::from(io_err), ConfigError::NotFound(_)));

        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert!(matches!(ConfigError::from(io_err), ConfigError::IoError(_)));
    }

    #[test]
    fn test_config_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let config_err: ConfigError = json_err.into();
        assert!(matches!(config_err, ConfigError::JsonError(_)));
    }

    #[test]
    fn test_invalid_value_display() {
        let err = ConfigError::invalid_value("mcp_servers.fs", "stdio transport requires 'command'");
        assert_eq!(
            err.to_string(),
            "Invalid value for mcp_servers.fs: stdio transport requires 'command'"
        );
    }

    #[test]
    fn test_anyhow_wraps_subsystem_errors() {
        let err: anyhow::Error = McpError::NotConnected("fs".into()).into();
        assert!(err.downcast_ref::<McpError>().is_some());
    }
}
