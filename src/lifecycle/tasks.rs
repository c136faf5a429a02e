//! Background task tracking.
//!
//! # Responsibilities
//! - Run detached work (e.g. outbound email) off the request path
//! - Count outstanding tasks so shutdown can wait for all of them
//! - Contain failures: an error or panic inside one task is logged and
//!   counted as completion, never propagated
//!
//! # Ordering
//! A task is registered before it is spawned and deregistered after its
//! work (or the caught panic) has finished, so `wait` cannot observe zero
//! while any task is mid-execution.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::observability::{metrics, panic_message};

/// Identifier for one background task, unique within a tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// How a background task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    /// The work returned an error.
    Failed(String),
    /// The work panicked; the panic was caught at the task boundary.
    Panicked(String),
}

impl TaskOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TaskOutcome::Completed => "completed",
            TaskOutcome::Failed(_) => "failed",
            TaskOutcome::Panicked(_) => "panicked",
        }
    }
}

/// Tracks detached units of work so they can be awaited at shutdown.
///
/// Clones share the same counter.
#[derive(Debug, Clone)]
pub struct BackgroundTasks {
    outstanding: Arc<watch::Sender<usize>>,
    next_id: Arc<AtomicU64>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            outstanding: Arc::new(tx),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register `work` and run it on its own task.
    ///
    /// The returned handle resolves to the task's outcome; dropping it does
    /// not cancel the work.
    pub fn spawn<F, E>(&self, name: &'static str, work: F) -> JoinHandle<TaskOutcome>
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let guard = self.register();

        tokio::spawn(async move {
            let id = guard.id;
            let outcome = match AssertUnwindSafe(work).catch_unwind().await {
                Ok(Ok(())) => TaskOutcome::Completed,
                Ok(Err(e)) => {
                    tracing::error!(task = name, task_id = %id, error = %e, "Background task failed");
                    TaskOutcome::Failed(e.to_string())
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::error!(task = name, task_id = %id, panic = %message, "Background task panicked");
                    TaskOutcome::Panicked(message)
                }
            };

            metrics::record_background_task(outcome.label());
            drop(guard);
            outcome
        })
    }

    /// Number of registered tasks that have not finished.
    pub fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }

    /// Wait until no task is outstanding.
    pub async fn wait(&self) {
        let mut rx = self.outstanding.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|count| *count == 0).await;
    }

    fn register(&self) -> TaskGuard {
        let mut count = 0;
        self.outstanding.send_modify(|n| {
            *n += 1;
            count = *n;
        });
        metrics::set_background_outstanding(count);

        TaskGuard {
            outstanding: Arc::clone(&self.outstanding),
            id: TaskId(self.next_id.fetch_add(1, Ordering::Relaxed)),
        }
    }
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}

/// Deregisters its task when dropped, including on cancellation.
struct TaskGuard {
    outstanding: Arc<watch::Sender<usize>>,
    id: TaskId,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        let mut count = 0;
        self.outstanding.send_modify(|n| {
            *n = n.saturating_sub(1);
            count = *n;
        });
        metrics::set_background_outstanding(count);
        tracing::trace!(task_id = %self.id, "Background task finished");
    }
}
