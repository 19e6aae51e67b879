//! Configuration loading and service wiring shared by the commands.

use crate::error::{CliError, CliResult};
use pgtenancy::prelude::*;
use pgtenancy_config::{ConfigService, FileFormat};
use pgtenancy_log::debug;
use pgtenancy_seaorm::{PoolOptions, SeaOrmAdminConnection, SeaOrmConnectionFactory, SeaOrmTenantStore};
use std::path::Path;

/// Loaded configuration plus constructors for the database-backed services.
pub struct App {
    config: Arc<TenancyConfig>,
}

impl App {
    /// Load files in order, then `.env`, then `PGTENANCY_*` variables.
    pub fn load(files: &[String], env_file: Option<&str>) -> CliResult<Self> {
        let mut builder = ConfigService::builder();
        for file in files {
            debug!("Loading configuration file {}", file);
            builder = builder.add_file(file.clone(), file_format(file)?);
        }

        let service = builder.load_dotenv(env_file.map(str::to_string)).build()?;
        Ok(Self::new(service.tenancy()?))
    }

    pub fn new(config: TenancyConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &TenancyConfig {
        &self.config
    }

    /// Tenant store on the shared connection
    pub async fn store(&self) -> CliResult<Arc<SeaOrmTenantStore>> {
        let conn = pgtenancy_seaorm::connect(self.config.default_template()?, &PoolOptions::default()).await?;
        Ok(Arc::new(SeaOrmTenantStore::new(conn)))
    }

    /// Tenant manager with a provisioner on the system connection.
    ///
    /// The key is checked before any connection is opened.
    pub async fn tenant_manager(&self) -> CliResult<TenantManager> {
        let cipher = CredentialCipher::from_config(&self.config)?;
        let store: Arc<dyn TenantStore> = self.store().await?;
        let admin = SeaOrmAdminConnection::connect(self.config.system_template()?).await?;

        let provisioner = SchemaProvisioner::new(Arc::new(admin), cipher);
        Ok(TenantManager::without_events(store, provisioner))
    }

    /// Tenancy manager for activating tenants one at a time
    pub fn tenancy(&self) -> CliResult<TenancyManager<SeaOrmConnectionFactory>> {
        let cipher = CredentialCipher::from_config(&self.config)?;
        Ok(
            TenancyManager::new(self.config.clone(), Arc::new(SeaOrmConnectionFactory::new()))
                .with_cipher(cipher),
        )
    }
}

fn file_format(path: &str) -> CliResult<FileFormat> {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(FileFormat::from_extension)
        .ok_or_else(|| {
            CliError::InvalidArgument(format!(
                "cannot tell the format of {} (expected .toml, .json or .env)",
                path
            ))
        })
}
