// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration loading from files.
//!
//! Handles loading configuration from JSON and YAML files in various locations.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ConfigError;

use super::types::SecretaryConfig;

/// Config file names to search for (in order).
pub const CONFIG_FILES: &[&str] = &[
    ".secretary.json",
    ".secretary.yaml",
    ".secretary.yml",
    ".secretary/config.json",
];

/// Global config directory name.
pub const GLOBAL_CONFIG_DIR: &str = ".secretary";

/// Global config file name.
pub const GLOBAL_CONFIG_FILE: &str = "config.json";

/// Get the global config directory path.
pub fn get_global_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(GLOBAL_CONFIG_DIR))
}

/// Get the global config file path.
pub fn get_global_config_path() -> Option<PathBuf> {
    get_global_config_dir().map(|dir| dir.join(GLOBAL_CONFIG_FILE))
}

/// Load a configuration file (JSON or YAML).
pub fn load_config_file(path: &Path) -> Result<SecretaryConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    match extension.to_lowercase().as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content).map_err(ConfigError::from),
        _ => serde_json::from_str(&content).map_err(ConfigError::from),
    }
}

/// Find the first workspace config file under `workspace_root`.
pub fn find_workspace_config(workspace_root: &Path) -> Option<PathBuf> {
    CONFIG_FILES
        .iter()
        .map(|name| workspace_root.join(name))
        .find(|path| path.exists())
}

/// Resolve which file to load: explicit path, then workspace files, then
/// the global file. `None` means no file exists and defaults apply.
pub fn resolve_config_path(
    explicit: Option<&Path>,
    workspace_root: &Path,
) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        return Ok(Some(path.to_path_buf()));
    }

    if let Some(path) = find_workspace_config(workspace_root) {
        return Ok(Some(path));
    }

    Ok(get_global_config_path().filter(|p| p.exists()))
}

/// Load and validate the configuration. Returns the file it came from, if any.
pub fn load_config(
    explicit: Option<&Path>,
    workspace_root: &Path,
) -> Result<(SecretaryConfig, Option<PathBuf>), ConfigError> {
    let path = resolve_config_path(explicit, workspace_root)?;

    let config = match &path {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config_file(path)?
        }
        None => {
            debug!("no config file found, using defaults");
            SecretaryConfig::default()
        }
    };

    config.validate()?;
    Ok((config, path))
}
