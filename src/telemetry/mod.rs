// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tracing and metrics.
//!
//! - **Tracing**: `tracing` spans and events throughout the crate; install a
//!   subscriber once with [`init_telemetry`].
//! - **Metrics**: with the `telemetry` feature, [`GLOBAL_METRICS`] records
//!   RPC latency per method, tool call outcomes, operation timings and
//!   resource cache hits.
//!
//! ```rust,ignore
//! use secretary::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(&TelemetryConfig::development())?;
//! ```

mod init;
pub mod metrics;

pub use init::{init_telemetry, TelemetryConfig, TelemetryGuard};
pub use metrics::{CallMetrics, Histogram, Metrics, MetricsSnapshot, OperationMetrics, GLOBAL_METRICS};
