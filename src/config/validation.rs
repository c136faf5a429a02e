//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ports, pool bounds, limiter rates)
//! - Parse duration strings such as "15m" or "1h30m"
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Config → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use crate::config::schema::Config;

/// A single failed rule, keyed by the dotted field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check every rule and report all failures together.
pub fn validate_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut check = |ok: bool, field: &'static str, message: &str| {
        if !ok {
            errors.push(ValidationError::new(field, message));
        }
    };

    check(config.server.port != 0, "server.port", "must be non-zero");
    check(
        config.server.request_timeout_secs > 0,
        "server.request_timeout_secs",
        "must be greater than zero",
    );

    let db = &config.database;
    check(!db.dsn.trim().is_empty(), "database.dsn", "must be provided");
    check(db.max_open_conns >= 1, "database.max_open_conns", "must be at least 1");
    check(
        db.max_idle_conns <= db.max_open_conns,
        "database.max_idle_conns",
        "must not exceed database.max_open_conns",
    );
    if let Err(e) = parse_duration(&db.max_idle_time) {
        check(false, "database.max_idle_time", &e.to_string());
    }

    let limiter = &config.limiter;
    if limiter.enabled {
        check(
            limiter.requests_per_second.is_finite() && limiter.requests_per_second > 0.0,
            "limiter.requests_per_second",
            "must be a positive number",
        );
        check(limiter.burst >= 1, "limiter.burst", "must be at least 1");
    }
    check(
        limiter.sweep_interval_secs > 0,
        "limiter.sweep_interval_secs",
        "must be greater than zero",
    );
    check(
        limiter.stale_after_secs > 0,
        "limiter.stale_after_secs",
        "must be greater than zero",
    );

    let smtp = &config.smtp;
    check(smtp.send_attempts >= 1, "smtp.send_attempts", "must be at least 1");
    check(smtp.timeout_secs > 0, "smtp.timeout_secs", "must be greater than zero");
    check(
        smtp.retry_base_delay_ms <= smtp.retry_max_delay_ms,
        "smtp.retry_base_delay_ms",
        "must not exceed smtp.retry_max_delay_ms",
    );

    for origin in &config.cors.trusted_origins {
        check(
            is_origin(origin),
            "cors.trusted_origins",
            &format!("{origin:?} is not an http(s) origin"),
        );
    }

    check(
        config.shutdown.grace_period_secs > 0,
        "shutdown.grace_period_secs",
        "must be greater than zero",
    );

    let obs = &config.observability;
    if obs.metrics_enabled {
        check(
            obs.metrics_address.parse::<SocketAddr>().is_ok(),
            "observability.metrics_address",
            "must be a socket address",
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_origin(value: &str) -> bool {
    let host = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"));
    matches!(host, Some(h) if !h.is_empty() && !h.contains('/'))
}

/// Error parsing a duration string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationError {
    #[error("empty duration")]
    Empty,
    #[error("invalid duration {0:?}")]
    Invalid(String),
    #[error("missing unit in duration {0:?}")]
    MissingUnit(String),
    #[error("unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit { unit: String, input: String },
    #[error("negative duration {0:?}")]
    Negative(String),
}

/// Parse a duration such as "300ms", "15m", "1.5h" or "2h45m".
///
/// Valid units are "ns", "us" (or "µs"), "ms", "s", "m", "h". A bare "0" is
/// accepted; every other number needs a unit.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(DurationError::Empty);
    }
    if s.starts_with('-') {
        return Err(DurationError::Negative(input.to_string()));
    }
    let s = s.strip_prefix('+').unwrap_or(s);
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let invalid = || DurationError::Invalid(input.to_string());
    let mut total_nanos = 0f64;
    let mut rest = s;

    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(num_len);
        if number.is_empty() || number == "." {
            return Err(invalid());
        }
        let value: f64 = number.parse().map_err(|_| invalid())?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let scale = match unit {
            "" => return Err(DurationError::MissingUnit(input.to_string())),
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            other => {
                return Err(DurationError::UnknownUnit {
                    unit: other.to_string(),
                    input: input.to_string(),
                })
            }
        };

        total_nanos += value * scale;
        rest = tail;
    }

    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(Duration::from_nanos(total_nanos.round() as u64))
}
