//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → http/middleware/admission.rs (shutdown check first)
//!     → rate_limit.rs (per-client token bucket)
//!     → Pass to handlers
//! ```
//!
//! # Design Decisions
//! - Client identity is the remote IP address
//! - The limiter knows nothing about HTTP; callers map denial to 429
//! - Sharded map: unrelated clients never contend on one lock

pub mod rate_limit;

pub use rate_limit::RateLimiter;
