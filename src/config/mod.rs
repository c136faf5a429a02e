//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! .env (optional, dotenvy)
//!     → environment variables
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//! command-line flags
//!     → cli.rs (override file/default values)
//!     → validation.rs (semantic checks)
//!     → Config (validated, immutable)
//!     → owned by the Application aggregate
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no runtime reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod cli;
pub mod loader;
pub mod schema;
pub mod validation;

pub use cli::Cli;
pub use loader::ConfigError;
pub use schema::{
    Config, CorsConfig, DatabaseConfig, Environment, LimiterConfig, ObservabilityConfig, ServerConfig,
    ShutdownConfig, SmtpConfig,
};
