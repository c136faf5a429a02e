//! Shutdown triggers.
//!
//! # Responsibilities
//! - Listen for SIGINT/SIGTERM and report which one arrived
//! - Provide a programmatic trigger for embedding and tests
//!
//! The orchestrator reacts to the first trigger only; signals arriving
//! after draining has begun are ignored.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::signal;
use tokio::sync::Notify;

/// Why shutdown started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Interrupt,
    Terminate,
    Requested,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShutdownReason::Interrupt => "SIGINT",
            ShutdownReason::Terminate => "SIGTERM",
            ShutdownReason::Requested => "requested",
        })
    }
}

/// A one-shot source of "begin shutting down".
pub trait ShutdownTrigger: Send + 'static {
    /// Resolve once shutdown should begin.
    fn wait(self) -> impl Future<Output = ShutdownReason> + Send;
}

/// Process signals: Ctrl-C everywhere, plus SIGTERM on Unix.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSignals;

impl ShutdownTrigger for OsSignals {
    fn wait(self) -> impl Future<Output = ShutdownReason> + Send {
        async {
            let interrupt = async {
                if let Err(e) = signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to listen for SIGINT");
                    std::future::pending::<()>().await;
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut stream) => {
                        stream.recv().await;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to listen for SIGTERM");
                        std::future::pending::<()>().await;
                    }
                }
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = interrupt => ShutdownReason::Interrupt,
                _ = terminate => ShutdownReason::Terminate,
            }
        }
    }
}

/// Trigger fired from code. Clones share one trigger.
///
/// Firing before anyone waits is remembered.
#[derive(Debug, Clone, Default)]
pub struct ManualTrigger {
    notify: Arc<Notify>,
}

impl ManualTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fire(&self) {
        self.notify.notify_one();
    }
}

impl ShutdownTrigger for ManualTrigger {
    fn wait(self) -> impl Future<Output = ShutdownReason> + Send {
        async move {
            self.notify.notified().await;
            ShutdownReason::Requested
        }
    }
}
