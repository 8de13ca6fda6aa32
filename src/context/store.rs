// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-memory, multi-indexed context store with TTL expiry.
//!
//! The primary `id -> entry` map and the four secondary indexes (project,
//! file, topic, type) live behind a single `RwLock`, so every mutation
//! updates all of them atomically with respect to readers. Index buckets
//! are pruned as soon as they become empty.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::cleanup::{self, CleanupHandle};
use super::error::ContextError;
use super::types::{non_empty, ContextEntry, ContextQuery, ContextStats, ContextType, QueryResult};

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;
#[cfg(feature = "telemetry")]
use std::time::Instant;

/// Default entry lifetime: one day.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

type Bucket = HashSet<String>;

#[derive(Debug, Default)]
struct StoreInner {
    entries: HashMap<String, ContextEntry>,
    by_project: HashMap<String, Bucket>,
    by_file: HashMap<String, Bucket>,
    by_topic: HashMap<String, Bucket>,
    by_type: HashMap<ContextType, Bucket>,
}

impl StoreInner {
    fn insert(&mut self, entry: ContextEntry) {
        if let Some(previous) = self.entries.remove(&entry.id) {
            self.unindex(&previous);
        }

        let id = entry.id.as_str();
        if let Some(project) = entry.project_key() {
            add_to_bucket(&mut self.by_project, project.to_string(), id);
        }
        if let Some(file) = entry.file_key() {
            add_to_bucket(&mut self.by_file, file.to_string(), id);
        }
        for topic in entry.topic_keys() {
            add_to_bucket(&mut self.by_topic, topic.to_string(), id);
        }
        add_to_bucket(&mut self.by_type, entry.entry_type, id);

        self.entries.insert(entry.id.clone(), entry);
    }

    fn remove(&mut self, id: &str) -> Option<ContextEntry> {
        let entry = self.entries.remove(id)?;
        self.unindex(&entry);
        Some(entry)
    }

    fn unindex(&mut self, entry: &ContextEntry) {
        let id = entry.id.as_str();
        if let Some(project) = entry.project_key() {
            remove_from_bucket(&mut self.by_project, project, id);
        }
        if let Some(file) = entry.file_key() {
            remove_from_bucket(&mut self.by_file, file, id);
        }
        for topic in entry.topic_keys() {
            remove_from_bucket(&mut self.by_topic, topic, id);
        }
        remove_from_bucket(&mut self.by_type, &entry.entry_type, id);
    }

    /// Index buckets selected by the query's dimensional filters.
    ///
    /// `None` means some filter matched no bucket, so the result is empty.
    fn filter_sets(&self, query: &ContextQuery) -> Option<Vec<&Bucket>> {
        let mut sets = Vec::with_capacity(4);
        if let Some(project) = non_empty(&query.project) {
            sets.push(self.by_project.get(project)?);
        }
        if let Some(file) = non_empty(&query.file) {
            sets.push(self.by_file.get(file)?);
        }
        if let Some(topic) = non_empty(&query.topic) {
            sets.push(self.by_topic.get(topic)?);
        }
        if let Some(entry_type) = &query.entry_type {
            sets.push(self.by_type.get(entry_type)?);
        }
        Some(sets)
    }
}

fn add_to_bucket<K: Eq + Hash>(index: &mut HashMap<K, Bucket>, key: K, id: &str) {
    index.entry(key).or_default().insert(id.to_string());
}

fn remove_from_bucket<K, Q>(index: &mut HashMap<K, Bucket>, key: &Q, id: &str)
where
    K: Eq + Hash + std::borrow::Borrow<Q>,
    Q: Eq + Hash + ?Sized,
{
    if let Some(bucket) = index.get_mut(key) {
        bucket.remove(id);
        if bucket.is_empty() {
            index.remove(key);
        }
    }
}

/// Thread-safe context repository.
#[derive(Debug)]
pub struct ContextStore {
    inner: RwLock<StoreInner>,
    default_ttl: Duration,
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextStore {
    /// Create a store with the default one-day TTL.
    pub fn new() -> Self {
        Self::with_default_ttl(DEFAULT_TTL)
    }

    /// Create a store whose entries expire after `ttl` unless they say
    /// otherwise. A zero TTL keeps entries forever.
    pub fn with_default_ttl(ttl: Duration) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            default_ttl: ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Insert an entry, assigning an id and expiry if it has none.
    /// Returns the entry's id.
    #[instrument(skip_all, fields(entry_type = %entry.entry_type))]
    pub async fn store(&self, mut entry: ContextEntry) -> String {
        if entry.id.is_empty() {
            entry.id = uuid::Uuid::new_v4().to_string();
        }

        if entry.expires_at.is_none() {
            let ttl = entry.ttl.take().unwrap_or(self.default_ttl);
            if !ttl.is_zero() {
                entry.expires_at = chrono::Duration::from_std(ttl)
                    .ok()
                    .and_then(|ttl| entry.timestamp.checked_add_signed(ttl));
            }
        }

        let id = entry.id.clone();
        self.inner.write().await.insert(entry);
        debug!(%id, "stored context entry");
        id
    }

    /// Fetch one entry, distinguishing missing from expired.
    pub async fn get(&self, id: &str) -> Result<ContextEntry, ContextError> {
        let inner = self.inner.read().await;
        let entry = inner
            .entries
            .get(id)
            .ok_or_else(|| ContextError::NotFound(id.to_string()))?;

        match entry.expires_at {
            Some(expired_at) if Utc::now() > expired_at => Err(ContextError::Expired {
                id: id.to_string(),
                expired_at,
            }),
            _ => Ok(entry.clone()),
        }
    }

    /// Find live entries matching every filter, newest first.
    pub async fn query(&self, query: &ContextQuery) -> QueryResult {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let inner = self.inner.read().await;
        let now = Utc::now();

        let Some(mut sets) = inner.filter_sets(query) else {
            return QueryResult::default();
        };

        let candidates: Vec<&ContextEntry> = if sets.is_empty() {
            inner.entries.values().collect()
        } else {
            sets.sort_by_key(|set| set.len());
            let (pivot, rest) = sets.split_at(1);
            pivot[0]
                .iter()
                .filter(|id| rest.iter().all(|set| set.contains(*id)))
                .filter_map(|id| inner.entries.get(id))
                .collect()
        };

        let mut matching: Vec<&ContextEntry> = candidates
            .into_iter()
            .filter(|e| !e.is_expired_at(now) && query.in_range(e.timestamp))
            .collect();

        // Ties broken by id so pages are stable across calls.
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));

        let total = matching.len();
        let limit = if query.limit == 0 { usize::MAX } else { query.limit };
        let entries: Vec<ContextEntry> = matching
            .into_iter()
            .skip(query.offset)
            .take(limit)
            .cloned()
            .collect();
        let has_more = query.offset.saturating_add(entries.len()) < total;

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("context.query", start.elapsed());

        QueryResult {
            entries,
            total,
            has_more,
        }
    }

    /// Remove an entry and its index references.
    pub async fn delete(&self, id: &str) -> Result<ContextEntry, ContextError> {
        self.inner
            .write()
            .await
            .remove(id)
            .ok_or_else(|| ContextError::NotFound(id.to_string()))
    }

    /// Physically remove every expired entry. Returns how many were removed.
    pub async fn expire_old_entries(&self) -> usize {
        let mut inner = self.inner.write().await;
        let now = Utc::now();

        let expired: Vec<String> = inner
            .entries
            .values()
            .filter(|e| e.is_expired_at(now))
            .map(|e| e.id.clone())
            .collect();

        for id in &expired {
            inner.remove(id);
        }

        if !expired.is_empty() {
            debug!(removed = expired.len(), remaining = inner.entries.len(), "expired context entries");
        }
        expired.len()
    }

    pub async fn stats(&self) -> ContextStats {
        let inner = self.inner.read().await;
        ContextStats {
            total_entries: inner.entries.len(),
            projects: inner.by_project.len(),
            files: inner.by_file.len(),
            topics: inner.by_topic.len(),
            by_type: inner
                .by_type
                .iter()
                .map(|(kind, bucket)| (*kind, bucket.len()))
                .collect(),
        }
    }

    /// Number of stored entries, expired ones included until swept.
    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Run [`expire_old_entries`](Self::expire_old_entries) every `interval`
    /// in the background until the returned handle is stopped or dropped.
    pub fn start_cleanup(self: &Arc<Self>, interval: Duration) -> CleanupHandle {
        cleanup::spawn(Arc::downgrade(self), interval)
    }
}
