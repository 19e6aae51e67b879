//! Request-scoped tenancy context
//!
//! [`TenancyManager`] is shared by the whole process and holds only
//! immutable settings. Each request takes its own [`TenancyContext`] from it,
//! so one request's search path and credentials are never visible to another.
//!
//! ```rust,ignore
//! let manager = TenancyManager::new(config, factory);
//!
//! let mut context = manager.begin();
//! context.initialize_for_tenant(tenant).await?;
//! let conn = context.connection().unwrap();
//! // ... queries resolve unqualified names in the tenant schema first
//! context.clear().await?;
//! ```

use crate::credentials::CredentialCipher;
use crate::error::{Result, TenancyError};
use crate::tenant::Tenant;
use async_trait::async_trait;
use pgtenancy_config::{ConnectionConfig, TenancyConfig};
use pgtenancy_log::{debug, warn};
use std::fmt;
use std::sync::Arc;

/// Name under which the tenant connection is installed
pub const SCOPED_CONNECTION: &str = "tenant";

/// Opens and closes database connections from a [`ConnectionConfig`]
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Connection type
    type Connection: Send + Sync;

    /// Establish a connection now, failing on bad settings or credentials
    async fn connect(&self, config: &ConnectionConfig) -> Result<Self::Connection>;

    /// Close a connection and release its pooled resources
    async fn disconnect(&self, connection: Self::Connection) -> Result<()>;
}

/// Shared entry point for per-request tenancy contexts
pub struct TenancyManager<F: ConnectionFactory> {
    factory: Arc<F>,
    config: Arc<TenancyConfig>,
    cipher: Option<CredentialCipher>,
}

impl<F: ConnectionFactory> Clone for TenancyManager<F> {
    fn clone(&self) -> Self {
        Self {
            factory: self.factory.clone(),
            config: self.config.clone(),
            cipher: self.cipher.clone(),
        }
    }
}

impl<F: ConnectionFactory> TenancyManager<F> {
    /// Create new manager with injected connection factory.
    ///
    /// A missing or invalid key is reported when a tenant is activated.
    pub fn new(config: Arc<TenancyConfig>, factory: Arc<F>) -> Self {
        let cipher = CredentialCipher::from_config(&config).ok();
        Self {
            factory,
            config,
            cipher,
        }
    }

    /// Use `cipher` instead of the configured key
    pub fn with_cipher(mut self, cipher: CredentialCipher) -> Self {
        self.cipher = Some(cipher);
        self
    }

    pub fn config(&self) -> &TenancyConfig {
        &self.config
    }

    pub fn factory(&self) -> &Arc<F> {
        &self.factory
    }

    /// Start an empty context for one request
    pub fn begin(&self) -> TenancyContext<F> {
        TenancyContext {
            manager: self.clone(),
            tenant: None,
            scoped: None,
            connection: None,
        }
    }

    /// Connection settings for `tenant`: the base template with the tenant's
    /// credentials and `search_path=<schema>,public`.
    pub fn scoped_config(&self, tenant: &Tenant) -> Result<ConnectionConfig> {
        let (schema, username, encrypted) = match (
            tenant.schema_name(),
            tenant.role_name(),
            tenant.db_password.as_deref().filter(|p| !p.is_empty()),
        ) {
            (Some(schema), Some(username), Some(password)) => (schema, username, password),
            _ => {
                return Err(TenancyError::Validation(format!(
                    "tenant {} is not provisioned (schema, db_username and db_password are required)",
                    tenant.label()
                )));
            }
        };

        let mut config = self.config.base_template()?.clone();

        let cipher = match self.cipher {
            Some(ref cipher) => cipher.clone(),
            None => CredentialCipher::from_config(&self.config)?,
        };

        config.username = username.to_string();
        config.password = cipher.decrypt(encrypted)?;
        config.append_option(&format!("-c search_path={},public", schema));

        Ok(config)
    }
}

impl<F: ConnectionFactory> fmt::Debug for TenancyManager<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenancyManager")
            .field("base_connection", &self.config.base_connection)
            .finish_non_exhaustive()
    }
}

/// Tenancy state of one request.
///
/// Holds at most one tenant with its scoped connection. Call
/// [`clear`](Self::clear) when the request ends; dropping the context
/// without clearing drops the connection without an orderly close.
pub struct TenancyContext<F: ConnectionFactory> {
    manager: TenancyManager<F>,
    tenant: Option<Tenant>,
    scoped: Option<ConnectionConfig>,
    connection: Option<F::Connection>,
}

impl<F: ConnectionFactory> TenancyContext<F> {
    /// Activate `tenant`, replacing any tenant already active.
    ///
    /// The scoped connection is established before returning. On failure the
    /// context is left empty.
    pub async fn initialize_for_tenant(&mut self, tenant: Tenant) -> Result<()> {
        self.clear().await?;

        let label = tenant.label();
        self.tenant = Some(tenant);

        match self.install().await {
            Ok(()) => {
                debug!("Tenant {} bound to connection '{}'", label, SCOPED_CONNECTION);
                Ok(())
            }
            Err(e) => {
                self.tenant = None;
                self.scoped = None;
                Err(e)
            }
        }
    }

    async fn install(&mut self) -> Result<()> {
        let tenant = self
            .tenant
            .as_ref()
            .ok_or_else(|| TenancyError::NotFound("no current tenant".to_string()))?;

        let scoped = self.manager.scoped_config(tenant)?;
        let connection = self.manager.factory.connect(&scoped).await?;

        self.scoped = Some(scoped);
        self.connection = Some(connection);
        Ok(())
    }

    /// Forget the current tenant and close its connection
    pub async fn clear(&mut self) -> Result<()> {
        let previous = self.tenant.take();
        self.scoped = None;

        if let Some(connection) = self.connection.take() {
            if let Err(e) = self.manager.factory.disconnect(connection).await {
                warn!(
                    "Closing connection of tenant {} failed: {}",
                    previous.as_ref().map(Tenant::label).unwrap_or_default(),
                    e
                );
                return Err(e);
            }
        }
        Ok(())
    }

    /// The active tenant
    pub fn current(&self) -> Option<&Tenant> {
        self.tenant.as_ref()
    }

    /// Name of the scoped connection
    pub fn scoped_connection_name(&self) -> &'static str {
        SCOPED_CONNECTION
    }

    /// Settings of the installed scoped connection
    pub fn scoped_config(&self) -> Option<&ConnectionConfig> {
        self.scoped.as_ref()
    }

    /// The live scoped connection
    pub fn connection(&self) -> Option<&F::Connection> {
        self.connection.as_ref()
    }

    pub fn connection_mut(&mut self) -> Option<&mut F::Connection> {
        self.connection.as_mut()
    }

    pub fn manager(&self) -> &TenancyManager<F> {
        &self.manager
    }
}

impl<F: ConnectionFactory> fmt::Debug for TenancyContext<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenancyContext")
            .field("tenant", &self.tenant.as_ref().map(|t| &t.slug))
            .field("scoped", &self.scoped)
            .field("connected", &self.connection.is_some())
            .finish()
    }
}
