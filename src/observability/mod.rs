//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events → logging.rs (one JSON record per line, single sink)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (log aggregation)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - The logger is built first and installed as the global subscriber
//! - Error and fatal records carry a captured backtrace
//! - Panics are written by the logger's hook, never as raw stderr text
//! - Metrics are cheap (atomic increments) and no-ops when disabled

pub mod logging;
pub mod metrics;

pub use logging::{panic_message, LogLevel, Logger, Properties};
