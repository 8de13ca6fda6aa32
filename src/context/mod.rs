// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Indexed, expiring context store.
//!
//! Entries record what the secretary has learned (file contents, project
//! notes, activity, topics) and are retrievable by project, file, topic,
//! type and time range. Everything lives in memory.
//!
//! # Example
//!
//! ```rust,ignore
//! use secretary::context::{ContextEntry, ContextQuery, ContextStore, ContextType};
//!
//! let store = Arc::new(ContextStore::new());
//! let sweep = store.start_cleanup(Duration::from_secs(300));
//!
//! store.store(
//!     ContextEntry::new(ContextType::File, "editor", "fn main() {}")
//!         .with_project("secretary")
//!         .with_file("src/main.rs"),
//! ).await;
//!
//! let page = store.query(&ContextQuery::new().project("secretary").limit(10)).await;
//! sweep.stop().await;
//! ```

pub mod cleanup;
pub mod error;
pub mod store;
pub mod types;

pub use cleanup::CleanupHandle;
pub use error::ContextError;
pub use store::{ContextStore, DEFAULT_TTL};
pub use types::{ContextEntry, ContextQuery, ContextStats, ContextType, QueryResult};
