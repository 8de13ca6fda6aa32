// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! URI-keyed cache of resource contents with TTL expiration.
//!
//! Expired entries are evicted lazily, by the read that finds them stale.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::mcp::ResourceContents;

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

/// Default resource cache lifetime: five minutes.
pub const DEFAULT_RESOURCE_TTL: Duration = Duration::from_secs(300);

/// A cached resource read.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedResource {
    pub uri: String,
    pub contents: Vec<ResourceContents>,
    pub cached_at: DateTime<Utc>,
    /// `None` when the cache TTL is zero (never expires).
    pub expires_at: Option<DateTime<Utc>>,
}

impl CachedResource {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }
}

/// Read-through cache of resource contents.
#[derive(Debug)]
pub struct ResourceCache {
    entries: RwLock<HashMap<String, CachedResource>>,
    ttl: Duration,
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new(DEFAULT_RESOURCE_TTL)
    }
}

impl ResourceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return a live entry. A stale one is removed and reported as a miss.
    pub async fn get(&self, uri: &str) -> Option<CachedResource> {
        let now = Utc::now();
        let live = {
            let entries = self.entries.read().await;
            match entries.get(uri) {
                Some(cached) if !cached.is_expired_at(now) => Some(cached.clone()),
                Some(_) => None,
                None => return record_lookup(None),
            }
        };
        if live.is_some() {
            return record_lookup(live);
        }

        // Re-check under the write lock: a concurrent insert may have refreshed it.
        let mut entries = self.entries.write().await;
        record_lookup(take_live(&mut entries, uri, now))
    }

    /// Cache contents for `uri`, replacing any previous entry.
    pub async fn insert(&self, uri: impl Into<String>, contents: Vec<ResourceContents>) -> CachedResource {
        let uri = uri.into();
        let cached_at = Utc::now();
        let expires_at = if self.ttl.is_zero() {
            None
        } else {
            chrono::Duration::from_std(self.ttl)
                .ok()
                .and_then(|ttl| cached_at.checked_add_signed(ttl))
        };

        let cached = CachedResource {
            uri: uri.clone(),
            contents,
            cached_at,
            expires_at,
        };
        self.entries.write().await.insert(uri, cached.clone());
        cached
    }

    pub async fn invalidate(&self, uri: &str) -> bool {
        self.entries.write().await.remove(uri).is_some()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Entries currently held, stale ones included until read.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Return the entry for `uri` if it is live at `now`, evicting it otherwise.
fn take_live(
    entries: &mut HashMap<String, CachedResource>,
    uri: &str,
    now: DateTime<Utc>,
) -> Option<CachedResource> {
    match entries.get(uri) {
        Some(cached) if !cached.is_expired_at(now) => Some(cached.clone()),
        Some(_) => {
            entries.remove(uri);
            None
        }
        None => None,
    }
}

fn record_lookup(found: Option<CachedResource>) -> Option<CachedResource> {
    #[cfg(feature = "telemetry")]
    GLOBAL_METRICS.record_cache(found.is_some());
    found
}
