//! # pgtenancy SeaORM
//!
//! PostgreSQL bindings for `pgtenancy` over SeaORM.
//!
//! ## Features
//!
//! - **Administrative connection**: runs provisioning DDL unprepared, never logged
//! - **Scoped connections**: one eagerly-checked pool per activated tenant
//! - **Tenant store**: the `tenants` table on the shared connection
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pgtenancy::prelude::*;
//! use pgtenancy_seaorm::{SeaOrmAdminConnection, SeaOrmConnectionFactory, SeaOrmTenantStore};
//!
//! let config = Arc::new(TenancyConfig::load(&manager)?);
//!
//! let admin = SeaOrmAdminConnection::connect(config.system_template()?).await?;
//! let shared = pgtenancy_seaorm::connect(config.default_template()?, &Default::default()).await?;
//! let store = Arc::new(SeaOrmTenantStore::new(shared));
//! store.install().await?;
//!
//! let tenancy = TenancyManager::new(config, Arc::new(SeaOrmConnectionFactory::new()))
//!     .with_cipher(CredentialCipher::from_config(&config)?);
//! ```

#![warn(clippy::all)]

mod config;
mod database;
mod error;
mod store;

pub use config::*;
pub use database::*;
pub use error::*;
pub use store::*;

// Re-export sea-orm types for convenience
pub use sea_orm;
pub use sea_query;
