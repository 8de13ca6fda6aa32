// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration module for the secretary.
//!
//! A single file supplies the finished configuration: MCP server
//! definitions, query mappings, cache and context-store settings. It is
//! looked up in this order:
//! - Explicit path (`--config`)
//! - Workspace: .secretary.json, .secretary.yaml, .secretary.yml, .secretary/config.json
//! - Global: ~/.secretary/config.json
//!
//! When no file exists the defaults apply.

mod loader;
mod types;

pub use loader::{
    find_workspace_config, get_global_config_dir, get_global_config_path, load_config,
    load_config_file, resolve_config_path, CONFIG_FILES, GLOBAL_CONFIG_DIR, GLOBAL_CONFIG_FILE,
};

pub use types::{CacheConfig, ContextConfig, SecretaryConfig};
