//! Command-line and environment overrides.
//!
//! Flags are optional: anything not given keeps the value from the config
//! file (if any) or the schema default.

use std::path::PathBuf;

use clap::Parser;

use crate::config::loader::{read_config, ConfigError};
use crate::config::schema::{Config, Environment};
use crate::config::validation::validate_config;
use crate::observability::LogLevel;

#[derive(Parser, Debug)]
#[command(name = "greenlight")]
#[command(about = "Greenlight movie catalogue API server", long_about = None)]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// TOML config file used as the base configuration
    #[arg(long, env = "GREENLIGHT_CONFIG")]
    pub config: Option<PathBuf>,

    /// API server port
    #[arg(long)]
    pub port: Option<u16>,

    /// Environment
    #[arg(long, value_enum)]
    pub env: Option<Environment>,

    /// PostgreSQL DSN
    #[arg(long = "db-dsn", env = "GREENLIGHT_DB_DSN", hide_env_values = true)]
    pub db_dsn: Option<String>,

    /// PostgreSQL max open connections
    #[arg(long = "db-max-open-conns")]
    pub db_max_open_conns: Option<u32>,

    /// PostgreSQL max idle connections
    #[arg(long = "db-max-idle-conns")]
    pub db_max_idle_conns: Option<u32>,

    /// PostgreSQL max connection idle time, e.g. "15m"
    #[arg(long = "db-max-idle-time")]
    pub db_max_idle_time: Option<String>,

    /// Rate limiter maximum requests per second
    #[arg(long = "limiter-rps")]
    pub limiter_rps: Option<f64>,

    /// Rate limiter maximum burst
    #[arg(long = "limiter-burst")]
    pub limiter_burst: Option<u32>,

    /// Enable rate limiter
    #[arg(long = "limiter-enabled", num_args = 0..=1, default_missing_value = "true")]
    pub limiter_enabled: Option<bool>,

    /// SMTP server hostname
    #[arg(long = "smtp-host", env = "MAILER_HOST")]
    pub smtp_host: Option<String>,

    /// SMTP server port
    #[arg(long = "smtp-port", env = "MAILER_PORT")]
    pub smtp_port: Option<u16>,

    /// SMTP server username
    #[arg(long = "smtp-username", env = "MAILER_USERNAME")]
    pub smtp_username: Option<String>,

    /// SMTP server password
    #[arg(long = "smtp-password", env = "MAILER_PASSWORD", hide_env_values = true)]
    pub smtp_password: Option<String>,

    /// SMTP sender address
    #[arg(long = "smtp-sender")]
    pub smtp_sender: Option<String>,

    /// Attempts per email before giving up
    #[arg(long = "smtp-send-attempts")]
    pub smtp_send_attempts: Option<u32>,

    /// Trusted CORS origins (space separated)
    #[arg(long = "cors-trusted-origins")]
    pub cors_trusted_origins: Option<String>,

    /// Seconds in-flight requests get to finish on shutdown
    #[arg(long = "shutdown-grace-secs")]
    pub shutdown_grace_secs: Option<u64>,

    /// Minimum log level
    #[arg(long = "log-level", env = "GREENLIGHT_LOG_LEVEL", value_enum)]
    pub log_level: Option<LogLevel>,

    /// Expose Prometheus metrics
    #[arg(long = "metrics-enabled", num_args = 0..=1, default_missing_value = "true")]
    pub metrics_enabled: Option<bool>,

    /// Prometheus metrics bind address
    #[arg(long = "metrics-address")]
    pub metrics_address: Option<String>,

    /// Display version and exit
    #[arg(long)]
    pub version: bool,
}

impl Cli {
    /// Build the validated configuration: file (or defaults), then flags.
    pub fn load_config(&self) -> Result<Config, ConfigError> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => Config::default(),
        };
        self.apply(&mut config);
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }

    fn apply(&self, config: &mut Config) {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *target = v.clone();
            }
        }

        set(&mut config.server.port, &self.port);
        set(&mut config.server.env, &self.env);

        set(&mut config.database.dsn, &self.db_dsn);
        set(&mut config.database.max_open_conns, &self.db_max_open_conns);
        set(&mut config.database.max_idle_conns, &self.db_max_idle_conns);
        set(&mut config.database.max_idle_time, &self.db_max_idle_time);

        set(&mut config.limiter.requests_per_second, &self.limiter_rps);
        set(&mut config.limiter.burst, &self.limiter_burst);
        set(&mut config.limiter.enabled, &self.limiter_enabled);

        set(&mut config.smtp.host, &self.smtp_host);
        set(&mut config.smtp.port, &self.smtp_port);
        set(&mut config.smtp.username, &self.smtp_username);
        set(&mut config.smtp.password, &self.smtp_password);
        set(&mut config.smtp.sender, &self.smtp_sender);
        set(&mut config.smtp.send_attempts, &self.smtp_send_attempts);

        if let Some(origins) = &self.cors_trusted_origins {
            config.cors.trusted_origins = origins.split_whitespace().map(str::to_string).collect();
        }

        set(&mut config.shutdown.grace_period_secs, &self.shutdown_grace_secs);

        set(&mut config.observability.log_level, &self.log_level);
        set(&mut config.observability.metrics_enabled, &self.metrics_enabled);
        set(&mut config.observability.metrics_address, &self.metrics_address);
    }
}
