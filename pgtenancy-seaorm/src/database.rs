//! Administrative and scoped connections over SeaORM.

use crate::config::{PoolOptions, connect_options};
use crate::error::map_db_err;
use async_trait::async_trait;
use pgtenancy::{AdminConnection, ConnectionConfig, ConnectionFactory, Result};
use pgtenancy_log::{debug, info};
use sea_orm::{ConnectionTrait, DatabaseConnection};

/// Open a pooled connection and check it with a ping.
pub async fn connect(config: &ConnectionConfig, pool: &PoolOptions) -> Result<DatabaseConnection> {
    let options = connect_options(config, pool)?;

    debug!("Connecting to {}:{}/{}", config.host, config.port, config.database);
    let conn = sea_orm::Database::connect(options).await.map_err(map_db_err)?;
    conn.ping().await.map_err(map_db_err)?;

    Ok(conn)
}

/// Privileged connection used to create and drop tenant schemas and roles.
#[derive(Clone)]
pub struct SeaOrmAdminConnection {
    conn: DatabaseConnection,
}

impl SeaOrmAdminConnection {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Connect with the system connection settings
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        info!("Opening administrative connection to {}", config.database);
        Ok(Self::new(connect(config, &PoolOptions::default()).await?))
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    pub async fn close(self) -> Result<()> {
        self.conn.close().await.map_err(map_db_err)
    }
}

#[async_trait]
impl AdminConnection for SeaOrmAdminConnection {
    async fn execute(&self, sql: &str) -> Result<()> {
        // Unprepared: DDL takes no bind parameters.
        self.conn.execute_unprepared(sql).await.map_err(map_db_err)?;
        Ok(())
    }
}

/// Opens the request-scoped tenant connections.
#[derive(Debug, Clone)]
pub struct SeaOrmConnectionFactory {
    pool: PoolOptions,
}

impl SeaOrmConnectionFactory {
    /// Factory with [`PoolOptions::scoped`] settings
    pub fn new() -> Self {
        Self::with_pool(PoolOptions::scoped())
    }

    pub fn with_pool(pool: PoolOptions) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PoolOptions {
        &self.pool
    }
}

impl Default for SeaOrmConnectionFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionFactory for SeaOrmConnectionFactory {
    type Connection = DatabaseConnection;

    async fn connect(&self, config: &ConnectionConfig) -> Result<Self::Connection> {
        connect(config, &self.pool).await
    }

    async fn disconnect(&self, connection: Self::Connection) -> Result<()> {
        connection.close().await.map_err(map_db_err)
    }
}
