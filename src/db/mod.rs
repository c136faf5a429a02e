//! PostgreSQL connection pool.
//!
//! The pool is opened once at startup and verified with a bounded ping so
//! an unreachable database fails the process before it starts listening.

use std::time::Duration;

use serde::Serialize;
use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;
use tokio::time;

use crate::config::{ConfigError, DatabaseConfig};

/// Upper bound on the startup ping and on waiting for a free connection.
const PING_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("database did not respond within {0:?}")]
    Timeout(Duration),
}

/// Pool settings derived from configuration.
pub fn pool_options(config: &DatabaseConfig) -> Result<PgPoolOptions, ConfigError> {
    let idle = config.max_idle_time()?;
    // Zero means connections may idle indefinitely.
    let idle_timeout = (!idle.is_zero()).then_some(idle);

    Ok(PgPoolOptions::new()
        .max_connections(config.max_open_conns)
        .idle_timeout(idle_timeout)
        .acquire_timeout(PING_TIMEOUT))
}

/// Build the pool without connecting. Connections open on first use.
pub fn open_lazy(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
    Ok(pool_options(config)?.connect_lazy(&config.dsn)?)
}

/// Build the pool and verify the database answers within [`PING_TIMEOUT`].
pub async fn open_pool(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
    let pool = open_lazy(config)?;

    match time::timeout(PING_TIMEOUT, sqlx::query("SELECT 1").execute(&pool)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            pool.close().await;
            return Err(e.into());
        }
        Err(_) => {
            pool.close().await;
            return Err(DatabaseError::Timeout(PING_TIMEOUT));
        }
    }

    tracing::info!(
        max_open_conns = config.max_open_conns,
        max_idle_conns = config.max_idle_conns,
        max_idle_time = %config.max_idle_time,
        "Database connection pool established"
    );
    Ok(pool)
}

/// Point-in-time pool occupancy.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PoolStats {
    pub size: u32,
    pub idle: usize,
    pub max_open: u32,
    pub max_idle: u32,
}

impl PoolStats {
    pub fn sample(pool: &PgPool, config: &DatabaseConfig) -> Self {
        Self {
            size: pool.size(),
            idle: pool.num_idle(),
            max_open: pool.options().get_max_connections(),
            max_idle: config.max_idle_conns,
        }
    }
}
