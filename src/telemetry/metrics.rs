// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Metrics collection for performance monitoring.
//!
//! In-process counters and latency histograms for RPC methods, tool calls,
//! named operations and the resource cache. No exporter: read a
//! [`MetricsSnapshot`] and print it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

/// Global metrics instance.
pub static GLOBAL_METRICS: Lazy<Metrics> = Lazy::new(Metrics::new);

/// Central metrics collection.
#[derive(Debug)]
pub struct Metrics {
    /// JSON-RPC requests by method.
    rpc: RwLock<HashMap<String, CallMetrics>>,

    /// Tool calls by `mcp.<server>.<tool>`.
    tools: RwLock<HashMap<String, CallMetrics>>,

    /// General operation metrics.
    operations: RwLock<HashMap<String, OperationMetrics>>,

    cache: CacheMetrics,

    start_time: Instant,
}

// Metrics must never take the process down; a poisoned map is still usable.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            rpc: RwLock::new(HashMap::new()),
            tools: RwLock::new(HashMap::new()),
            operations: RwLock::new(HashMap::new()),
            cache: CacheMetrics::default(),
            start_time: Instant::now(),
        }
    }

    /// Record one JSON-RPC request round trip.
    pub fn record_rpc(&self, method: &str, duration: Duration, success: bool) {
        write(&self.rpc)
            .entry(method.to_string())
            .or_default()
            .record(duration, success);
    }

    /// Record a tool execution.
    pub fn record_tool(&self, name: &str, duration: Duration, success: bool) {
        write(&self.tools)
            .entry(name.to_string())
            .or_default()
            .record(duration, success);
    }

    /// Record a generic operation.
    pub fn record_operation(&self, name: &str, duration: Duration) {
        write(&self.operations)
            .entry(name.to_string())
            .or_default()
            .record(duration);
    }

    pub fn record_cache(&self, hit: bool) {
        self.cache.record(hit);
    }

    pub fn rpc_metrics(&self, method: &str) -> Option<CallMetrics> {
        read(&self.rpc).get(method).cloned()
    }

    pub fn tool_metrics(&self, name: &str) -> Option<CallMetrics> {
        read(&self.tools).get(name).cloned()
    }

    pub fn operation_metrics(&self, name: &str) -> Option<OperationMetrics> {
        read(&self.operations).get(name).cloned()
    }

    /// Cache (hits, misses).
    pub fn cache_counts(&self) -> (u64, u64) {
        (self.cache.hits(), self.cache.misses())
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Take a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rpc: read(&self.rpc).clone(),
            tools: read(&self.tools).clone(),
            operations: read(&self.operations).clone(),
            cache_hits: self.cache.hits(),
            cache_misses: self.cache.misses(),
            uptime: self.uptime(),
        }
    }

    pub fn reset(&self) {
        write(&self.rpc).clear();
        write(&self.tools).clear();
        write(&self.operations).clear();
        self.cache.reset();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics for a call that can succeed or fail.
#[derive(Debug, Clone)]
pub struct CallMetrics {
    pub invocations: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_duration: Duration,
    pub min_duration: Duration,
    pub max_duration: Duration,
    pub histogram: Histogram,
}

impl CallMetrics {
    pub fn new() -> Self {
        Self {
            invocations: 0,
            successes: 0,
            failures: 0,
            total_duration: Duration::ZERO,
            min_duration: Duration::MAX,
            max_duration: Duration::ZERO,
            histogram: Histogram::default(),
        }
    }

    pub fn record(&mut self, duration: Duration, success: bool) {
        self.invocations += 1;
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        self.total_duration += duration;
        self.min_duration = self.min_duration.min(duration);
        self.max_duration = self.max_duration.max(duration);
        self.histogram.record(duration);
    }

    pub fn avg_duration(&self) -> Duration {
        if self.invocations == 0 {
            Duration::ZERO
        } else {
            self.total_duration / self.invocations as u32
        }
    }

    /// Success rate (0.0 to 1.0).
    pub fn success_rate(&self) -> f64 {
        if self.invocations == 0 {
            1.0
        } else {
            self.successes as f64 / self.invocations as f64
        }
    }
}

impl Default for CallMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Generic operation metrics with histogram.
#[derive(Debug, Clone)]
pub struct OperationMetrics {
    pub count: u64,
    pub total_duration: Duration,
    pub min_duration: Duration,
    pub max_duration: Duration,
    pub histogram: Histogram,
}

impl OperationMetrics {
    pub fn new() -> Self {
        Self {
            count: 0,
            total_duration: Duration::ZERO,
            min_duration: Duration::MAX,
            max_duration: Duration::ZERO,
            histogram: Histogram::default(),
        }
    }

    pub fn record(&mut self, duration: Duration) {
        self.count += 1;
        self.total_duration += duration;
        self.min_duration = self.min_duration.min(duration);
        self.max_duration = self.max_duration.max(duration);
        self.histogram.record(duration);
    }

    pub fn avg_duration(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total_duration / self.count as u32
        }
    }
}

impl Default for OperationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Simple histogram with fixed buckets for latency tracking.
#[derive(Debug, Clone)]
pub struct Histogram {
    /// Bucket upper bounds in microseconds.
    buckets: Vec<u64>,
    /// One count per bucket plus the overflow bucket.
    counts: Vec<u64>,
}

impl Histogram {
    /// Create a histogram with custom bucket boundaries (in microseconds).
    pub fn with_buckets(buckets: Vec<u64>) -> Self {
        let counts = vec![0; buckets.len() + 1];
        Self { buckets, counts }
    }

    pub fn record(&mut self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        let bucket_idx = self
            .buckets
            .iter()
            .position(|&b| micros <= b)
            .unwrap_or(self.buckets.len());
        self.counts[bucket_idx] += 1;
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn buckets(&self) -> &[u64] {
        &self.buckets
    }

    /// Approximate percentile: the upper bound of the bucket holding it.
    pub fn percentile(&self, p: f64) -> Duration {
        let total: u64 = self.counts.iter().sum();
        if total == 0 {
            return Duration::ZERO;
        }

        let target = (total as f64 * p / 100.0).ceil() as u64;
        let mut cumulative = 0u64;

        for (i, &count) in self.counts.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                let micros = match self.buckets.get(i) {
                    Some(&bound) => bound,
                    None => self.buckets.last().copied().unwrap_or(0) * 10,
                };
                return Duration::from_micros(micros);
            }
        }

        Duration::ZERO
    }

    pub fn p50(&self) -> Duration {
        self.percentile(50.0)
    }

    pub fn p99(&self) -> Duration {
        self.percentile(99.0)
    }
}

impl Default for Histogram {
    fn default() -> Self {
        // 100us, 1ms, 10ms, 100ms, 1s, 10s
        Self::with_buckets(vec![100, 1_000, 10_000, 100_000, 1_000_000, 10_000_000])
    }
}

#[derive(Debug, Default)]
struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheMetrics {
    fn record(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

/// A snapshot of all metrics at a point in time.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub rpc: HashMap<String, CallMetrics>,
    pub tools: HashMap<String, CallMetrics>,
    pub operations: HashMap<String, OperationMetrics>,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub uptime: Duration,
}

impl MetricsSnapshot {
    /// Format as a human-readable report, each section sorted by name.
    pub fn format_report(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Metrics Report ===\n\n");
        report.push_str(&format!("Uptime: {:.2?}\n", self.uptime));
        report.push_str(&format!(
            "Resource cache: {} hits, {} misses\n\n",
            self.cache_hits, self.cache_misses
        ));

        for (title, calls) in [("RPC Methods", &self.rpc), ("Tool Calls", &self.tools)] {
            if calls.is_empty() {
                continue;
            }
            report.push_str(title);
            report.push_str(":\n");
            let mut names: Vec<_> = calls.keys().collect();
            names.sort();
            for name in names {
                let metrics = &calls[name];
                report.push_str(&format!(
                    "  {}: {} calls, {:.1}% success, avg {:.2?}, p99 {:.2?}\n",
                    name,
                    metrics.invocations,
                    metrics.success_rate() * 100.0,
                    metrics.avg_duration(),
                    metrics.histogram.p99()
                ));
            }
            report.push('\n');
        }

        if !self.operations.is_empty() {
            report.push_str("Operation Metrics:\n");
            let mut names: Vec<_> = self.operations.keys().collect();
            names.sort();
            for name in names {
                let metrics = &self.operations[name];
                report.push_str(&format!(
                    "  {}: {} ops, avg {:.2?}, p99 {:.2?}\n",
                    name,
                    metrics.count,
                    metrics.avg_duration(),
                    metrics.histogram.p99()
                ));
            }
        }

        report
    }
}
