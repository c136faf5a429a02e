//! Outbound email.
//!
//! # Data Flow
//! ```text
//! Application::send_email
//!     → lifecycle/tasks.rs (tracked background task)
//!     → resilience/retries.rs (bounded attempts)
//!     → Mailer::send
//!         → templates.rs (subject / plain / html blocks)
//!         → smtp.rs (multipart message over SMTP)
//! ```
//!
//! Handlers never call a `Mailer` directly; delivery always happens off
//! the request path so shutdown can account for it.

pub mod smtp;
pub mod templates;

use futures_util::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;

pub use smtp::SmtpMailer;
pub use templates::{RenderedEmail, Templates};

#[derive(Debug, Error)]
pub enum MailerError {
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("invalid address {address:?}: {source}")]
    Address {
        address: String,
        source: lettre::address::AddressError,
    },

    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("smtp error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

/// Delivers a templated message to one recipient.
pub trait Mailer: Send + Sync {
    fn send<'a>(&'a self, recipient: &'a str, template: &'a str, data: &'a Value) -> BoxFuture<'a, Result<(), MailerError>>;
}
