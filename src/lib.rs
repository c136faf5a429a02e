//! Greenlight API server library.
//!
//! Lifecycle core of the Greenlight movie catalogue API: structured logging,
//! per-client rate limiting, background task tracking and graceful shutdown.

// Core subsystems
pub mod app;
pub mod config;
pub mod db;
pub mod http;
pub mod mailer;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use app::Application;
pub use config::Config;
pub use http::HttpServer;
pub use lifecycle::{Shutdown, ShutdownOrchestrator};

/// Application version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build timestamp, injected at compile time through `BUILD_TIME`.
pub const BUILD_TIME: &str = match option_env!("BUILD_TIME") {
    Some(time) => time,
    None => "unknown",
};
