//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound call (e.g. SMTP delivery):
//!     → retries.rs (bounded attempts)
//!     → backoff.rs (exponential delay with jitter between attempts)
//! ```
//!
//! # Design Decisions
//! - Retries happen inside background tasks, never on the request path
//! - Jittered backoff prevents thundering herd

pub mod backoff;
pub mod retries;

pub use retries::{retry, RetryPolicy};
