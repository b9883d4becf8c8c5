// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Detached background work (welcome messages, webhooks, reconnects, timers).

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use leadflow_core::LeadflowError;

/// Tracked executor for fire-and-forget tasks.
///
/// Failures are logged under the task's label and never reach the caller.
/// [`drain`](Self::drain) waits for outstanding work at shutdown.
#[derive(Debug, Clone, Default)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a fallible task; an `Err` is logged as a warning.
    pub fn spawn<F>(&self, label: &'static str, task: F)
    where
        F: Future<Output = Result<(), LeadflowError>> + Send + 'static,
    {
        self.tracker.spawn(async move {
            if let Err(e) = task.await {
                warn!(task = label, error = %e, "background task failed");
            }
        });
    }

    /// Spawn an infallible task and keep its handle (for timers that get aborted).
    pub fn spawn_handle<F>(&self, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(task)
    }

    /// Number of tasks still running.
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Wait up to `timeout` for every task to finish. Returns true if drained.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tracker.close();
        let pending = self.tracker.len();
        if pending > 0 {
            info!(pending, "waiting for background tasks");
        }
        let drained = tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_ok();
        if !drained {
            warn!(remaining = self.tracker.len(), "background tasks still running at shutdown");
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn drain_waits_for_spawned_work() {
        let tasks = BackgroundTasks::new();
        let done = Arc::new(AtomicBool::new(false));
        let flag = done.clone();
        tasks.spawn("set-flag", async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });

        assert!(tasks.drain(Duration::from_secs(1)).await);
        assert!(done.load(Ordering::SeqCst));
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn failing_task_does_not_panic() {
        let tasks = BackgroundTasks::new();
        tasks.spawn("fails", async { Err(LeadflowError::Internal("boom".into())) });
        assert!(tasks.drain(Duration::from_secs(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_times_out_on_stuck_task() {
        let tasks = BackgroundTasks::new();
        let handle = tasks.spawn_handle(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        assert!(!tasks.drain(Duration::from_millis(50)).await);
        handle.abort();
    }
}
