//! Pool settings and SeaORM connect options.

use pgtenancy::{ConnectionConfig, Result};
use pgtenancy_log::{redact_url, trace};
use sea_orm::ConnectOptions;
use std::time::Duration;

/// Pool size used when neither the connection nor the pool sets one
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Pool settings applied on top of a [`ConnectionConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct PoolOptions {
    /// Overrides `ConnectionConfig::max_connections` when set
    pub max_connections: Option<u32>,

    pub min_connections: u32,

    pub connect_timeout: Duration,

    pub idle_timeout: Duration,

    pub max_lifetime: Duration,

    /// Off by default: provisioning statements carry role passwords.
    pub sqlx_logging: bool,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections: None,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(10 * 60),
            max_lifetime: Duration::from_secs(30 * 60),
            sqlx_logging: false,
        }
    }
}

impl PoolOptions {
    /// Settings for a request-scoped tenant connection: a single physical
    /// connection that is closed when the request ends.
    pub fn scoped() -> Self {
        Self {
            max_connections: Some(1),
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            ..Self::default()
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = Some(max);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn sqlx_logging(mut self, enabled: bool) -> Self {
        self.sqlx_logging = enabled;
        self
    }
}

/// Build SeaORM connect options for `config`.
///
/// The URL carries the libpq `options` parameter, so a tenant configuration's
/// `search_path` applies to every pooled connection.
pub fn connect_options(config: &ConnectionConfig, pool: &PoolOptions) -> Result<ConnectOptions> {
    let url = config.to_url()?;
    trace!("Connect options for {}", redact_url(&url));

    let max_connections = pool
        .max_connections
        .or(config.max_connections)
        .unwrap_or(DEFAULT_MAX_CONNECTIONS);

    let mut options = ConnectOptions::new(url);
    options
        .max_connections(max_connections)
        .min_connections(pool.min_connections.min(max_connections))
        .connect_timeout(pool.connect_timeout)
        .idle_timeout(pool.idle_timeout)
        .max_lifetime(pool.max_lifetime)
        .sqlx_logging(pool.sqlx_logging);

    Ok(options)
}
