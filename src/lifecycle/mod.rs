//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → Metrics exporter → Database pool → Mailer → Application
//!     → Limiter sweeper → Bind listener
//!
//! Shutdown (shutdown.rs):
//!     Trigger → Stop admitting → Drain in-flight (grace period)
//!     → Drain background tasks → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!
//! Background work (tasks.rs):
//!     spawn → register → run (panics contained) → deregister
//! ```
//!
//! # Design Decisions
//! - Ordered startup: a failed dependency aborts before the listener binds
//! - Shutdown state has a single writer; everything else holds a handle
//! - In-flight draining is bounded by the grace period, background draining is not

pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod tasks;

pub use shutdown::{
    LifecycleError, Shutdown, ShutdownHandle, ShutdownOrchestrator, ShutdownOutcome, ShutdownState,
};
pub use signals::{ManualTrigger, OsSignals, ShutdownReason, ShutdownTrigger};
pub use startup::{Started, StartupError};
pub use tasks::{BackgroundTasks, TaskOutcome};
