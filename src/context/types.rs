// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Context entry, query and statistics types.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of context an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextType {
    File,
    Project,
    Activity,
    Topic,
}

impl ContextType {
    pub const ALL: [ContextType; 4] = [Self::File, Self::Project, Self::Activity, Self::Topic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Project => "project",
            Self::Activity => "activity",
            Self::Topic => "topic",
        }
    }
}

impl fmt::Display for ContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContextType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "project" => Ok(Self::Project),
            "activity" => Ok(Self::Activity),
            "topic" => Ok(Self::Topic),
            other => Err(format!(
                "unknown context type '{}' (expected file, project, activity or topic)",
                other
            )),
        }
    }
}

/// One immutable record in the context store.
///
/// Entries are never updated in place: storing an entry under an existing id
/// replaces the old record wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextEntry {
    /// Unique id. Left empty, the store assigns a UUID.
    #[serde(default)]
    pub id: String,

    #[serde(rename = "type")]
    pub entry_type: ContextType,

    /// Who produced the entry, e.g. `mcp:filesystem`.
    pub source: String,

    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    #[serde(default)]
    pub topics: Vec<String>,

    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// `None` after storing means the entry never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub metadata: HashMap<String, Value>,

    /// Requested lifetime, resolved into `expires_at` by the store.
    #[serde(skip)]
    pub(crate) ttl: Option<Duration>,
}

impl ContextEntry {
    /// Create an entry stamped with the current time.
    pub fn new(entry_type: ContextType, source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            entry_type,
            source: source.into(),
            content: content.into(),
            summary: None,
            project: None,
            file: None,
            topics: Vec::new(),
            timestamp: Utc::now(),
            expires_at: None,
            metadata: HashMap::new(),
            ttl: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_topics(mut self, topics: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.topics = topics.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Lifetime measured from `timestamp`. Zero means the entry never expires.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self.expires_at = None;
        self
    }

    /// Absolute expiry, overriding any TTL.
    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self.ttl = None;
        self
    }

    /// True once `now` is past `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Project key used for indexing; empty strings count as absent.
    pub(crate) fn project_key(&self) -> Option<&str> {
        non_empty(&self.project)
    }

    pub(crate) fn file_key(&self) -> Option<&str> {
        non_empty(&self.file)
    }

    pub(crate) fn topic_keys(&self) -> impl Iterator<Item = &str> {
        self.topics.iter().map(String::as_str).filter(|t| !t.is_empty())
    }
}

pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Filter for [`ContextStore::query`](super::ContextStore::query).
///
/// Dimensional filters (project, file, topic, type) are intersected. Empty
/// strings are ignored. `limit == 0` returns every match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextQuery {
    pub project: Option<String>,
    pub file: Option<String>,
    pub topic: Option<String>,
    #[serde(rename = "type")]
    pub entry_type: Option<ContextType>,
    /// Inclusive lower bound on `timestamp`.
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `timestamp`.
    pub until: Option<DateTime<Utc>>,
    pub limit: usize,
    pub offset: usize,
}

impl ContextQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn entry_type(mut self, entry_type: ContextType) -> Self {
        self.entry_type = Some(entry_type);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// True when `timestamp` lies inside the requested range.
    pub(crate) fn in_range(&self, timestamp: DateTime<Utc>) -> bool {
        self.since.is_none_or(|since| timestamp >= since)
            && self.until.is_none_or(|until| timestamp <= until)
    }
}

/// One page of query results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub entries: Vec<ContextEntry>,
    /// Matches before pagination.
    pub total: usize,
    pub has_more: bool,
}

/// Store-wide counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextStats {
    pub total_entries: usize,
    pub projects: usize,
    pub files: usize,
    pub topics: usize,
    pub by_type: HashMap<ContextType, usize>,
}
