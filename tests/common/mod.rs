//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::connect_info::MockConnectInfo;
use axum::Router;
use futures_util::future::BoxFuture;
use serde_json::Value;

use greenlight::config::Config;
use greenlight::lifecycle::Shutdown;
use greenlight::mailer::{Mailer, MailerError};
use greenlight::observability::{LogLevel, Logger};
use greenlight::{Application, HttpServer};

/// Mailer that records recipients instead of talking SMTP.
#[derive(Default)]
pub struct RecordingMailer {
    delay: Duration,
    fail: bool,
    attempts: AtomicU32,
    sent: Mutex<Vec<String>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each delivery takes `delay`.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Every delivery fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Mailer for RecordingMailer {
    fn send<'a>(&'a self, recipient: &'a str, _template: &'a str, _data: &'a Value) -> BoxFuture<'a, Result<(), MailerError>> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;

            if self.fail {
                let source = "unreachable".parse::<lettre::Address>().unwrap_err();
                return Err(MailerError::Address {
                    address: recipient.to_string(),
                    source,
                });
            }

            self.sent.lock().unwrap().push(recipient.to_string());
            Ok(())
        })
    }
}

/// Defaults with a limiter that effectively never refills.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.limiter.requests_per_second = 0.001;
    config.limiter.burst = 4;
    config.cors.trusted_origins = vec!["https://trusted.example".to_string()];
    config
}

pub struct TestApp {
    pub app: Arc<Application>,
    pub shutdown: Shutdown,
}

/// Build an application with a lazy (never connected) pool and a silent logger.
pub fn build_app(config: Config, mailer: Arc<dyn Mailer>) -> TestApp {
    let shutdown = Shutdown::new();
    let db = greenlight::db::open_lazy(&config.database).unwrap();
    let logger = Logger::new(std::io::sink(), LogLevel::Off);
    let app = Arc::new(Application::new(config, logger, db, mailer, shutdown.handle()));
    TestApp { app, shutdown }
}

/// The production router as seen from `client`.
pub fn router_for(app: &Arc<Application>, client: [u8; 4]) -> Router {
    HttpServer::new(Arc::clone(app))
        .router()
        .layer(MockConnectInfo(SocketAddr::from((client, 40000))))
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
