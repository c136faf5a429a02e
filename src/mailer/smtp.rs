//! SMTP delivery via lettre.

use std::time::Duration;

use futures_util::future::BoxFuture;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde_json::Value;

use crate::config::SmtpConfig;
use crate::mailer::{Mailer, MailerError, Templates};

/// Port on which the server expects TLS from the first byte.
const IMPLICIT_TLS_PORT: u16 = 465;

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
    templates: Templates,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, MailerError> {
        let sender = parse_mailbox(&config.sender)?;

        let tls = if config.host.is_empty() {
            tracing::warn!("SMTP host not configured, outbound email will fail");
            Tls::None
        } else if config.port == IMPLICIT_TLS_PORT {
            Tls::Wrapper(TlsParameters::new(config.host.clone())?)
        } else {
            Tls::Opportunistic(TlsParameters::new(config.host.clone())?)
        };

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(config.host.as_str())
            .port(config.port)
            .tls(tls)
            .timeout(Some(Duration::from_secs(config.timeout_secs)));

        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(config.username.clone(), config.password.clone()));
        }

        tracing::debug!(host = %config.host, port = config.port, sender = %sender, "SMTP mailer configured");

        Ok(Self {
            transport: builder.build(),
            sender,
            templates: Templates::embedded()?,
        })
    }

    /// Render `template` and build the multipart message without sending it.
    pub fn compose(&self, recipient: &str, template: &str, data: &Value) -> Result<Message, MailerError> {
        let rendered = self.templates.render(template, data)?;
        let to = parse_mailbox(recipient)?;

        let message = Message::builder()
            .from(self.sender.clone())
            .to(to)
            .subject(rendered.subject)
            .multipart(MultiPart::alternative_plain_html(rendered.plain_body, rendered.html_body))?;
        Ok(message)
    }
}

impl Mailer for SmtpMailer {
    fn send<'a>(&'a self, recipient: &'a str, template: &'a str, data: &'a Value) -> BoxFuture<'a, Result<(), MailerError>> {
        Box::pin(async move {
            let message = self.compose(recipient, template, data)?;
            self.transport.send(message).await?;
            tracing::debug!(recipient, template, "Email sent");
            Ok(())
        })
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailerError> {
    address.parse().map_err(|source| MailerError::Address {
        address: address.to_string(),
        source,
    })
}
