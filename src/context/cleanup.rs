// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Background expiry sweep for the context store.

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::store::ContextStore;

/// Shortest accepted sweep period.
const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Handle to a running sweep task.
///
/// Dropping the handle also ends the sweep, on the task's next wake-up.
pub struct CleanupHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CleanupHandle {
    /// Signal the sweep to stop and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            if !e.is_cancelled() {
                warn!("context cleanup task failed: {}", e);
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl std::fmt::Debug for CleanupHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupHandle")
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

/// Spawn the sweep. It holds only a weak reference, so it also exits once
/// the store itself is gone.
pub(crate) fn spawn(store: Weak<ContextStore>, interval: Duration) -> CleanupHandle {
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let period = interval.max(MIN_INTERVAL);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(store) = store.upgrade() else {
                        debug!("context store dropped, stopping cleanup");
                        break;
                    };
                    store.expire_old_entries().await;
                }
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("context cleanup stopped");
    });

    CleanupHandle { stop_tx, task }
}

#[cfg(test)]
mod tests {
    use crate::context::{ContextEntry, ContextStore, ContextType};
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_sweep_removes_expired_entries() {
        let store = Arc::new(ContextStore::new());
        store
            .store(
                ContextEntry::new(ContextType::Activity, "test", "stale")
                    .with_expires_at(Utc::now() - ChronoDuration::seconds(1)),
            )
            .await;
        store.store(ContextEntry::new(ContextType::Activity, "test", "fresh")).await;

        let handle = store.start_cleanup(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(store.len().await, 1);

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_stop_ends_task() {
        let store = Arc::new(ContextStore::new());
        let handle = store.start_cleanup(Duration::from_secs(60));
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_dropping_store_ends_task() {
        let store = Arc::new(ContextStore::new());
        let handle = store.start_cleanup(Duration::from_millis(10));
        drop(store);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished());
    }
}
