//! Retry with backoff for outbound calls.
//!
//! # Design Decisions
//! - Every error is treated as transient; callers that know better should
//!   not route through here
//! - Delays come from `backoff::calculate_backoff`
//! - The last error is returned unchanged once attempts run out

use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::config::SmtpConfig;
use crate::resilience::backoff::calculate_backoff;

/// Attempt budget and delay bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Values below 1 behave as 1.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    /// A single attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    pub fn delay_before(&self, retry: u32) -> Duration {
        calculate_backoff(retry, self.base_delay_ms, self.max_delay_ms)
    }
}

impl From<&SmtpConfig> for RetryPolicy {
    fn from(config: &SmtpConfig) -> Self {
        Self {
            max_attempts: config.send_attempts,
            base_delay_ms: config.retry_base_delay_ms,
            max_delay_ms: config.retry_max_delay_ms,
        }
    }
}

/// Run `attempt` until it succeeds or the policy is exhausted.
pub async fn retry<F, Fut, T, E>(policy: RetryPolicy, operation: &'static str, mut attempt: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut tried = 1;

    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if tried < max_attempts => {
                let delay = policy.delay_before(tried);
                tracing::warn!(
                    operation,
                    attempt = tried,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                tried += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
