//! Schema-per-tenant multi-tenancy for PostgreSQL
//!
//! Every tenant owns one schema and one login role in a shared database.
//! Requests are bound to their tenant's role and `search_path` before any
//! data access, and unbound when they finish.
//!
//! # Features
//!
//! - **Provisioning** - Ordered role/schema/grant statements, and their teardown
//! - **Credentials** - Generated role passwords, stored only encrypted
//! - **Resolution** - Subdomain, path segment or current team
//! - **Request-scoped context** - One tenancy context per request, never shared
//! - **Lifecycle orchestration** - Explicit create/delete flows with notifications
//!
//! # Quick Start
//!
//! ## 1. Provision a tenant
//!
//! ```rust,ignore
//! use pgtenancy::prelude::*;
//!
//! let cipher = CredentialCipher::from_config(&config)?;
//! let provisioner = SchemaProvisioner::new(admin_connection, cipher);
//! let manager = TenantManager::new(store.clone(), provisioner, Arc::new(NullEventSink));
//!
//! let created = manager.create(CreateTenantRequest::new("acme")).await?;
//! println!("password for {}: {}", created.tenant.slug, created.password);
//! ```
//!
//! ## 2. Bind requests
//!
//! ```rust,ignore
//! let tenancy = TenancyManager::new(config.clone(), connection_factory);
//! let gate = TenantGate::from_config(tenancy, store)?;
//!
//! let request = RequestDescriptor::new("acme.example.com", "/dashboard");
//! gate.handle(&request, |context| Box::pin(async move {
//!     let conn = context.connection();
//!     // ...
//!     Ok(())
//! })).await?;
//! ```

pub mod context;
pub mod credentials;
pub mod error;
pub mod events;
pub mod management;
pub mod middleware;
pub mod naming;
pub mod resolver;
pub mod schema;
pub mod store;
pub mod tenant;

pub use context::{ConnectionFactory, SCOPED_CONNECTION, TenancyContext, TenancyManager};
pub use credentials::{CredentialCipher, generate_password};
pub use error::{Result, TenancyError};
pub use events::{BroadcastEventSink, EventSink, NullEventSink, TenantEvent, TenantEventKind};
pub use management::{CreateTenantRequest, ProvisionedTenant, TeamLifecycle, TenantManager};
pub use middleware::TenantGate;
pub use naming::{role_name, schema_name};
pub use resolver::{
    Identity, PathTenantResolver, RequestDescriptor, SubdomainTenantResolver, TeamTenantResolver,
    TenantResolver, resolver_for_mode,
};
pub use schema::{AdminConnection, ProvisionStep, SchemaProvisioner};
pub use store::{InMemoryTenantStore, TenantStore};
pub use tenant::{Team, Tenant};

pub use pgtenancy_config::{ConnectionConfig, TenancyConfig, TenancyMode};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::context::{ConnectionFactory, TenancyContext, TenancyManager};
    pub use crate::credentials::CredentialCipher;
    pub use crate::error::{Result, TenancyError};
    pub use crate::events::{BroadcastEventSink, EventSink, NullEventSink, TenantEvent};
    pub use crate::management::{CreateTenantRequest, TeamLifecycle, TenantManager};
    pub use crate::middleware::TenantGate;
    pub use crate::resolver::{Identity, RequestDescriptor, TenantResolver, resolver_for_mode};
    pub use crate::schema::{AdminConnection, SchemaProvisioner};
    pub use crate::store::{InMemoryTenantStore, TenantStore};
    pub use crate::tenant::{Team, Tenant};
    pub use pgtenancy_config::{ConnectionConfig, TenancyConfig, TenancyMode};
    pub use std::sync::Arc;
}
