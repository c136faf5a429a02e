//! Greenlight API server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ request id → trace → metrics → panic recovery → CORS
//!                     → timeout → admission (shutdown gate, rate limit) → handler
//!                                                                           │
//!                                                        send_email ────────┤
//!                                                                           ▼
//!                                                               background tasks
//!
//!     SIGINT/SIGTERM → Draining → (in-flight done) → DrainingBackground
//!                    → (background done) → Stopped
//!                    └─ grace period expired → ForcedStop
//! ```

use std::process::ExitCode;

use clap::Parser;

use greenlight::config::Cli;
use greenlight::lifecycle::{startup, OsSignals};
use greenlight::observability::{LogLevel, Logger, Properties};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine; values may come from the real environment.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    if cli.version {
        println!("Version:\t{}", greenlight::VERSION);
        println!("Build time:\t{}", greenlight::BUILD_TIME);
        return ExitCode::SUCCESS;
    }

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => Logger::stdout(LogLevel::Info).fatal(&e, Properties::new()),
    };

    let logger = Logger::stdout(config.observability.log_level);
    if let Err(e) = logger.install() {
        logger.fatal(&e, Properties::new());
    }
    logger.install_panic_hook();

    let started = match startup::start(config, logger.clone()).await {
        Ok(started) => started,
        Err(e) => logger.fatal(&e, Properties::new()),
    };

    match startup::run(started, OsSignals).await {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => logger.fatal(&e, Properties::new()),
    }
}
