//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order
//! - Start the limiter sweeper
//! - Bind the listener last, so traffic arrives only once everything is ready
//! - Hand the assembled pieces to the shutdown orchestrator
//!
//! # Design Decisions
//! - Fail fast: any startup error is returned before the listener binds
//! - Subsystems initialize in order, not concurrently

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use metrics_exporter_prometheus::BuildError;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::app::Application;
use crate::config::Config;
use crate::db::{self, DatabaseError};
use crate::http::HttpServer;
use crate::lifecycle::shutdown::{LifecycleError, Shutdown, ShutdownOrchestrator, ShutdownOutcome};
use crate::lifecycle::signals::ShutdownTrigger;
use crate::mailer::{MailerError, SmtpMailer};
use crate::observability::{metrics, Logger};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("failed to configure mailer: {0}")]
    Mailer(#[from] MailerError),

    #[error("invalid metrics address {0:?}")]
    MetricsAddress(String),

    #[error("failed to start metrics exporter: {0}")]
    Metrics(#[from] BuildError),

    #[error("failed to bind {address}: {source}")]
    Bind { address: String, source: io::Error },
}

/// Everything needed to start serving.
pub struct Started {
    pub app: Arc<Application>,
    pub orchestrator: ShutdownOrchestrator,
    pub listener: TcpListener,
}

/// Bring up every dependency and bind the listener.
pub async fn start(config: Config, logger: Logger) -> Result<Started, StartupError> {
    if config.observability.metrics_enabled {
        let address = &config.observability.metrics_address;
        let addr: SocketAddr = address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(address.clone()))?;
        metrics::init_metrics(addr)?;
    }

    let db = db::open_pool(&config.database).await?;
    let mailer = SmtpMailer::new(&config.smtp)?;

    let shutdown = Shutdown::new();
    let app = Arc::new(Application::new(config, logger, db, Arc::new(mailer), shutdown.handle()));

    tokio::spawn(Arc::clone(app.limiter()).run_sweeper(shutdown.handle()));

    let address = app.config().server.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind { address, source })?;

    let orchestrator = ShutdownOrchestrator::new(shutdown, app.tasks().clone(), app.config().shutdown.grace_period());

    Ok(Started {
        app,
        orchestrator,
        listener,
    })
}

/// Serve until `trigger` fires and shutdown completes.
pub async fn run<T: ShutdownTrigger>(started: Started, trigger: T) -> Result<ShutdownOutcome, LifecycleError> {
    let Started {
        app,
        orchestrator,
        listener,
    } = started;

    let mut properties = crate::observability::Properties::new();
    properties.insert("addr".to_string(), listener.local_addr()?.to_string());
    properties.insert("env".to_string(), app.config().server.env.to_string());
    app.logger().info("starting server", properties);

    let server = HttpServer::new(app);
    orchestrator
        .run(trigger, move |shutdown| server.serve(listener, shutdown))
        .await
}
