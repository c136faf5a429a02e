//! Embedded email templates.
//!
//! Each template defines three blocks: `subject`, `plain` and `html`.
//! They are rendered individually against the same data.

use minijinja::{Environment, UndefinedBehavior};
use serde_json::Value;

use crate::mailer::MailerError;

const EMBEDDED: &[(&str, &str)] = &[("user_welcome.tmpl", include_str!("templates/user_welcome.tmpl"))];

/// The three parts of a rendered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub plain_body: String,
    pub html_body: String,
}

#[derive(Debug)]
pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    /// Templates compiled into the binary.
    pub fn embedded() -> Result<Self, MailerError> {
        let mut env = Environment::new();
        // A missing data key fails the send instead of rendering blank.
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        for (name, source) in EMBEDDED {
            env.add_template(*name, *source)?;
        }
        Ok(Self { env })
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> {
        EMBEDDED.iter().map(|(name, _)| *name)
    }

    pub fn render(&self, name: &str, data: &Value) -> Result<RenderedEmail, MailerError> {
        let template = self.env.get_template(name)?;
        let mut captured = template.render_captured(data)?;

        captured.with_state_mut(|state| -> Result<RenderedEmail, MailerError> {
            Ok(RenderedEmail {
                subject: state.render_block("subject")?.trim().to_string(),
                plain_body: state.render_block("plain")?,
                html_body: state.render_block("html")?,
            })
        })
    }
}
