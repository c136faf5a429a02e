//! Graceful shutdown state machine.
//!
//! # States
//! ```text
//! Running ──trigger──▶ Draining ──server drained──▶ DrainingBackground ──tasks done──▶ Stopped
//!                         │
//!                         └──grace period expired──▶ ForcedStop
//! ```
//!
//! Transitions only move forward. Once the state leaves `Running` no new
//! request is admitted, and nothing ever moves it back.
//!
//! [`Shutdown`] is the single writer and is owned by the orchestrator;
//! everything else observes through cloned [`ShutdownHandle`]s.

use std::fmt;
use std::future::Future;
use std::io;
use std::process::ExitCode;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinError;
use tokio::time;

use crate::lifecycle::signals::ShutdownTrigger;
use crate::lifecycle::tasks::BackgroundTasks;
use crate::observability::metrics;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running = 0,
    Draining = 1,
    DrainingBackground = 2,
    Stopped = 3,
    ForcedStop = 4,
}

impl ShutdownState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShutdownState::Running => "running",
            ShutdownState::Draining => "draining",
            ShutdownState::DrainingBackground => "draining_background",
            ShutdownState::Stopped => "stopped",
            ShutdownState::ForcedStop => "forced_stop",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ShutdownState::Stopped | ShutdownState::ForcedStop)
    }

    fn can_advance_to(self, next: ShutdownState) -> bool {
        use ShutdownState::*;
        matches!(
            (self, next),
            (Running, Draining)
                | (Draining, DrainingBackground)
                | (Draining, ForcedStop)
                | (DrainingBackground, Stopped)
        )
    }
}

impl From<u8> for ShutdownState {
    fn from(value: u8) -> Self {
        match value {
            0 => ShutdownState::Running,
            1 => ShutdownState::Draining,
            2 => ShutdownState::DrainingBackground,
            3 => ShutdownState::Stopped,
            _ => ShutdownState::ForcedStop,
        }
    }
}

impl fmt::Display for ShutdownState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of the shutdown state.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    state: Arc<AtomicU8>,
    changes: watch::Receiver<ShutdownState>,
}

impl ShutdownHandle {
    pub fn state(&self) -> ShutdownState {
        ShutdownState::from(self.state.load(Ordering::Acquire))
    }

    /// Whether new requests may be admitted.
    pub fn is_accepting(&self) -> bool {
        self.state() == ShutdownState::Running
    }

    /// Resolve once the state has left `Running`.
    ///
    /// Also resolves if the owning [`Shutdown`] was dropped.
    pub async fn draining(&self) {
        let mut changes = self.changes.clone();
        let _ = changes.wait_for(|state| *state != ShutdownState::Running).await;
    }
}

/// Owner of the process shutdown state.
#[derive(Debug)]
pub struct Shutdown {
    state: Arc<AtomicU8>,
    changes: watch::Sender<ShutdownState>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(ShutdownState::Running);
        Self {
            state: Arc::new(AtomicU8::new(ShutdownState::Running as u8)),
            changes,
        }
    }

    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            state: Arc::clone(&self.state),
            changes: self.changes.subscribe(),
        }
    }

    pub fn state(&self) -> ShutdownState {
        ShutdownState::from(self.state.load(Ordering::Acquire))
    }

    /// Stop admitting new requests. Returns `false` if already draining.
    pub fn begin_draining(&self) -> bool {
        self.advance(ShutdownState::Draining)
    }

    /// Move to `next` if it directly follows the current state.
    pub fn advance(&self, next: ShutdownState) -> bool {
        let current = self.state();
        if !current.can_advance_to(next) {
            tracing::debug!(from = %current, to = %next, "Ignoring shutdown transition");
            return false;
        }

        if self
            .state
            .compare_exchange(current as u8, next as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        self.changes.send_replace(next);
        metrics::record_shutdown_state(next as u8);
        tracing::debug!(from = %current, to = %next, "Shutdown state changed");
        true
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// How the process stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// In-flight requests and background tasks all finished.
    Stopped,
    /// The grace period expired first.
    ForcedStop,
}

impl ShutdownOutcome {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            ShutdownOutcome::Stopped => ExitCode::SUCCESS,
            ShutdownOutcome::ForcedStop => ExitCode::FAILURE,
        }
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("http server failed: {0}")]
    Server(#[from] io::Error),

    #[error("http server task ended abnormally: {0}")]
    ServerTask(#[from] JoinError),
}

/// Drives the process from trigger to stop.
///
/// Sequence: wait for the trigger, stop admissions, give in-flight
/// requests up to the grace period, then wait for every background task.
/// If the grace period expires the server is aborted and background work
/// is abandoned.
#[derive(Debug)]
pub struct ShutdownOrchestrator {
    shutdown: Shutdown,
    tasks: BackgroundTasks,
    grace_period: Duration,
}

impl ShutdownOrchestrator {
    pub fn new(shutdown: Shutdown, tasks: BackgroundTasks, grace_period: Duration) -> Self {
        Self {
            shutdown,
            tasks,
            grace_period,
        }
    }

    pub fn handle(&self) -> ShutdownHandle {
        self.shutdown.handle()
    }

    /// Run `serve` until `trigger` fires and everything has drained.
    ///
    /// `serve` receives a handle whose `draining()` it must use to stop
    /// accepting connections and finish in-flight requests.
    pub async fn run<T, F, Fut>(self, trigger: T, serve: F) -> Result<ShutdownOutcome, LifecycleError>
    where
        T: ShutdownTrigger,
        F: FnOnce(ShutdownHandle) -> Fut,
        Fut: Future<Output = io::Result<()>> + Send + 'static,
    {
        let mut server = tokio::spawn(serve(self.shutdown.handle()));

        let early_exit = tokio::select! {
            reason = trigger.wait() => {
                tracing::info!(signal = %reason, "Shutting down server");
                None
            }
            joined = &mut server => {
                tracing::warn!("HTTP server exited before shutdown was requested");
                Some(joined)
            }
        };

        self.shutdown.begin_draining();

        let joined = match early_exit {
            Some(joined) => joined,
            None => match time::timeout(self.grace_period, &mut server).await {
                Ok(joined) => joined,
                Err(_) => {
                    server.abort();
                    self.shutdown.advance(ShutdownState::ForcedStop);
                    tracing::error!(
                        grace_period_secs = self.grace_period.as_secs(),
                        background_outstanding = self.tasks.outstanding(),
                        "Grace period expired with requests in flight, forcing shutdown"
                    );
                    return Ok(ShutdownOutcome::ForcedStop);
                }
            },
        };

        let served = joined
            .map_err(LifecycleError::from)
            .and_then(|result| result.map_err(LifecycleError::from));

        self.shutdown.advance(ShutdownState::DrainingBackground);
        tracing::info!(
            outstanding = self.tasks.outstanding(),
            "Completing background tasks"
        );
        self.tasks.wait().await;
        self.shutdown.advance(ShutdownState::Stopped);

        served?;
        tracing::info!("Stopped server");
        Ok(ShutdownOutcome::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::signals::ManualTrigger;
    use std::convert::Infallible;
    use std::sync::atomic::AtomicBool;

    fn drain_on_signal(handle: ShutdownHandle) -> impl Future<Output = io::Result<()>> + Send + 'static {
        async move {
            handle.draining().await;
            Ok(())
        }
    }

    #[test]
    fn starts_running_and_accepting() {
        let shutdown = Shutdown::new();
        let handle = shutdown.handle();
        assert_eq!(handle.state(), ShutdownState::Running);
        assert!(handle.is_accepting());
    }

    #[test]
    fn draining_stops_admissions_for_every_handle() {
        let shutdown = Shutdown::new();
        let a = shutdown.handle();
        let b = a.clone();

        assert!(shutdown.begin_draining());
        assert!(!a.is_accepting());
        assert!(!b.is_accepting());
        assert!(!shutdown.begin_draining());
    }

    #[test]
    fn transitions_only_move_forward() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.advance(ShutdownState::Stopped));
        assert!(!shutdown.advance(ShutdownState::DrainingBackground));

        assert!(shutdown.begin_draining());
        assert!(!shutdown.advance(ShutdownState::Running));
        assert!(shutdown.advance(ShutdownState::DrainingBackground));
        assert!(!shutdown.advance(ShutdownState::ForcedStop));
        assert!(shutdown.advance(ShutdownState::Stopped));

        assert!(!shutdown.advance(ShutdownState::Running));
        assert_eq!(shutdown.state(), ShutdownState::Stopped);
        assert!(shutdown.state().is_terminal());
    }

    #[tokio::test]
    async fn draining_future_resolves_on_transition() {
        let shutdown = Shutdown::new();
        let handle = shutdown.handle();
        let waiter = tokio::spawn(async move { handle.draining().await });

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        shutdown.begin_draining();
        waiter.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stops_only_after_background_work_completes() {
        let shutdown = Shutdown::new();
        let handle = shutdown.handle();
        let tasks = BackgroundTasks::new();
        let sent = Arc::new(AtomicBool::new(false));

        let flag = sent.clone();
        tasks.spawn("send_email", async move {
            time::sleep(Duration::from_secs(5)).await;
            flag.store(true, Ordering::SeqCst);
            Ok::<_, Infallible>(())
        });

        let trigger = ManualTrigger::new();
        trigger.fire();

        let orchestrator = ShutdownOrchestrator::new(shutdown, tasks.clone(), Duration::from_secs(20));
        let outcome = orchestrator.run(trigger, drain_on_signal).await.unwrap();

        assert_eq!(outcome, ShutdownOutcome::Stopped);
        assert!(sent.load(Ordering::SeqCst));
        assert_eq!(tasks.outstanding(), 0);
        assert_eq!(handle.state(), ShutdownState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn grace_period_expiry_forces_stop() {
        let shutdown = Shutdown::new();
        let handle = shutdown.handle();
        let tasks = BackgroundTasks::new();

        let trigger = ManualTrigger::new();
        trigger.fire();

        let orchestrator = ShutdownOrchestrator::new(shutdown, tasks, Duration::from_secs(20));
        let outcome = orchestrator
            .run(trigger, |handle| async move {
                handle.draining().await;
                // An in-flight request that never finishes in time.
                time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(outcome, ShutdownOutcome::ForcedStop);
        assert_eq!(handle.state(), ShutdownState::ForcedStop);
        assert!(!handle.is_accepting());
    }

    #[tokio::test(start_paused = true)]
    async fn server_failure_still_drains_background_work() {
        let shutdown = Shutdown::new();
        let handle = shutdown.handle();
        let tasks = BackgroundTasks::new();
        tasks.spawn("slow", async {
            time::sleep(Duration::from_secs(3)).await;
            Ok::<_, Infallible>(())
        });

        let orchestrator = ShutdownOrchestrator::new(shutdown, tasks.clone(), Duration::from_secs(20));
        let result = orchestrator
            .run(ManualTrigger::new(), |_| async {
                Err(io::Error::new(io::ErrorKind::AddrInUse, "address in use"))
            })
            .await;

        assert!(matches!(result, Err(LifecycleError::Server(_))));
        assert_eq!(tasks.outstanding(), 0);
        assert_eq!(handle.state(), ShutdownState::Stopped);
    }
}
