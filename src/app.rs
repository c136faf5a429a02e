//! The application aggregate shared by every handler.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::Value;
use sqlx::PgPool;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::lifecycle::{BackgroundTasks, ShutdownHandle, TaskOutcome};
use crate::mailer::Mailer;
use crate::observability::Logger;
use crate::resilience::{retry, RetryPolicy};
use crate::security::RateLimiter;

/// Configuration plus every long-lived dependency.
///
/// Built once at startup and shared behind an `Arc`.
pub struct Application {
    config: Config,
    logger: Logger,
    db: PgPool,
    mailer: Arc<dyn Mailer>,
    tasks: BackgroundTasks,
    limiter: Arc<RateLimiter>,
    shutdown: ShutdownHandle,
    requests_in_flight: AtomicUsize,
}

impl Application {
    pub fn new(config: Config, logger: Logger, db: PgPool, mailer: Arc<dyn Mailer>, shutdown: ShutdownHandle) -> Self {
        let limiter = Arc::new(RateLimiter::new(&config.limiter));
        Self {
            config,
            logger,
            db,
            mailer,
            tasks: BackgroundTasks::new(),
            limiter,
            shutdown,
            requests_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn db(&self) -> &PgPool {
        &self.db
    }

    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn shutdown(&self) -> &ShutdownHandle {
        &self.shutdown
    }

    /// Deliver `template` to `recipient` on a tracked background task.
    ///
    /// Returns immediately. Failures are retried per the SMTP settings and
    /// then logged by the tracker; they never reach the caller's request.
    pub fn send_email(&self, recipient: impl Into<String>, template: &'static str, data: Value) -> JoinHandle<TaskOutcome> {
        let mailer = Arc::clone(&self.mailer);
        let recipient = recipient.into();
        let policy = RetryPolicy::from(&self.config.smtp);

        self.tasks.spawn("send_email", async move {
            let (mailer, recipient, data) = (&mailer, recipient.as_str(), &data);
            retry(policy, "send_email", move || mailer.send(recipient, template, data)).await
        })
    }

    /// Count a request as in flight until the guard drops.
    pub fn track_request(&self) -> RequestGuard<'_> {
        self.requests_in_flight.fetch_add(1, Ordering::AcqRel);
        RequestGuard {
            count: &self.requests_in_flight,
        }
    }

    pub fn requests_in_flight(&self) -> usize {
        self.requests_in_flight.load(Ordering::Acquire)
    }
}

pub struct RequestGuard<'a> {
    count: &'a AtomicUsize,
}

impl Drop for RequestGuard<'_> {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::AcqRel);
    }
}
