//! PostgreSQL Schema Per Tenant
//!
//! Creates and removes a tenant's schema and login role through a privileged
//! administrative connection.
//!
//! # Usage
//!
//! ```rust,ignore
//! let provisioner = SchemaProvisioner::new(admin, cipher);
//!
//! let mut tenant = Tenant::new("acme");
//! let password = provisioner.create_for_tenant(&mut tenant, None).await?;
//! store.insert(tenant).await?;
//! ```

use crate::credentials::{CredentialCipher, generate_password};
use crate::error::{Result, TenancyError};
use crate::naming::{is_reserved_schema, role_name, schema_name};
use crate::tenant::Tenant;
use async_trait::async_trait;
use pgtenancy_log::{debug, info, warn};
use std::fmt;
use std::sync::Arc;

/// Privileged connection that runs provisioning statements.
///
/// Implementations must not log the SQL they receive: `CREATE ROLE` carries
/// the role password.
#[async_trait]
pub trait AdminConnection: Send + Sync {
    /// Execute one statement without parameters
    async fn execute(&self, sql: &str) -> Result<()>;
}

/// Category of a provisioning statement, reported on failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProvisionStep {
    CreateRole,
    CreateSchema,
    GrantUsage,
    DefaultTablePrivileges,
    DefaultSequencePrivileges,
    ReassignOwned,
    DropOwned,
    DropSchema,
    DropRole,
}

impl ProvisionStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionStep::CreateRole => "create role",
            ProvisionStep::CreateSchema => "create schema",
            ProvisionStep::GrantUsage => "grant usage",
            ProvisionStep::DefaultTablePrivileges => "default table privileges",
            ProvisionStep::DefaultSequencePrivileges => "default sequence privileges",
            ProvisionStep::ReassignOwned => "reassign owned",
            ProvisionStep::DropOwned => "drop owned",
            ProvisionStep::DropSchema => "drop schema",
            ProvisionStep::DropRole => "drop role",
        }
    }
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quote an identifier, doubling embedded double quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal, doubling embedded single quotes
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Statements that create a tenant, in execution order
pub fn create_statements(schema: &str, role: &str, password: &str) -> Vec<(ProvisionStep, String)> {
    let schema = quote_ident(schema);
    let role = quote_ident(role);

    vec![
        (
            ProvisionStep::CreateRole,
            format!(
                "CREATE ROLE {} WITH LOGIN PASSWORD {} NOSUPERUSER NOCREATEDB NOCREATEROLE NOINHERIT NOREPLICATION;",
                role,
                quote_literal(password)
            ),
        ),
        (
            ProvisionStep::CreateSchema,
            format!("CREATE SCHEMA IF NOT EXISTS {} AUTHORIZATION {};", schema, role),
        ),
        (
            ProvisionStep::GrantUsage,
            format!("GRANT USAGE ON SCHEMA {} TO {};", schema, role),
        ),
        (
            ProvisionStep::DefaultTablePrivileges,
            format!(
                "ALTER DEFAULT PRIVILEGES IN SCHEMA {} GRANT SELECT, INSERT, UPDATE, DELETE ON TABLES TO {};",
                schema, role
            ),
        ),
        (
            ProvisionStep::DefaultSequencePrivileges,
            format!(
                "ALTER DEFAULT PRIVILEGES IN SCHEMA {} GRANT USAGE, SELECT, UPDATE ON SEQUENCES TO {};",
                schema, role
            ),
        ),
    ]
}

/// Statements that remove a tenant, in execution order.
///
/// Ownership is reassigned before anything is dropped; the role goes last.
pub fn drop_statements(schema: &str, role: &str) -> Vec<(ProvisionStep, String)> {
    let schema = quote_ident(schema);
    let role = quote_ident(role);

    vec![
        (
            ProvisionStep::ReassignOwned,
            format!("REASSIGN OWNED BY {} TO CURRENT_USER;", role),
        ),
        (ProvisionStep::DropOwned, format!("DROP OWNED BY {};", role)),
        (
            ProvisionStep::DropSchema,
            format!("DROP SCHEMA IF EXISTS {} CASCADE;", schema),
        ),
        (ProvisionStep::DropRole, format!("DROP ROLE IF EXISTS {};", role)),
    ]
}

/// Statements that undo a `create_statements` run whose tenant was never saved.
///
/// `DROP OWNED` removes the schema only when the new role owns it. A schema
/// that existed before provisioning loses the role's grants and nothing else.
pub fn rollback_statements(role: &str) -> Vec<(ProvisionStep, String)> {
    let role = quote_ident(role);

    vec![
        (ProvisionStep::DropOwned, format!("DROP OWNED BY {};", role)),
        (ProvisionStep::DropRole, format!("DROP ROLE IF EXISTS {};", role)),
    ]
}

/// Schema and role provisioner
///
/// Stateless apart from its collaborators; tenants of different slugs may be
/// provisioned concurrently. Callers serialize work on the same tenant.
#[derive(Clone)]
pub struct SchemaProvisioner {
    admin: Arc<dyn AdminConnection>,
    cipher: CredentialCipher,
}

impl SchemaProvisioner {
    /// Create new provisioner with injected admin connection
    pub fn new(admin: Arc<dyn AdminConnection>, cipher: CredentialCipher) -> Self {
        Self { admin, cipher }
    }

    pub fn cipher(&self) -> &CredentialCipher {
        &self.cipher
    }

    /// Create the tenant's role and schema.
    ///
    /// Assigns `schema`/`db_username` from the slug when unset, stores the
    /// encrypted password on `tenant`, and returns the plaintext password.
    /// The caller persists the tenant afterwards.
    ///
    /// Completed statements are not undone when a later one fails.
    pub async fn create_for_tenant(
        &self,
        tenant: &mut Tenant,
        password: Option<&str>,
    ) -> Result<String> {
        if tenant.slug.trim().is_empty() {
            return Err(TenancyError::Validation("tenant slug cannot be empty".to_string()));
        }

        if tenant.schema_name().is_none() {
            tenant.schema = Some(schema_name(&tenant.slug));
        }
        if tenant.role_name().is_none() {
            tenant.db_username = Some(role_name(&tenant.slug));
        }
        if let Some(schema) = tenant.schema_name().filter(|s| is_reserved_schema(s)) {
            return Err(TenancyError::Validation(format!("schema '{}' is reserved", schema)));
        }

        let password = match password {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => generate_password(),
        };
        tenant.db_password = Some(self.cipher.encrypt(&password)?);

        let schema = tenant.schema_name().unwrap_or_default().to_string();
        let role = tenant.role_name().unwrap_or_default().to_string();

        info!(
            "Provisioning tenant {} (schema={}, role={})",
            tenant.slug, schema, role
        );
        self.run(create_statements(&schema, &role, &password)).await?;

        Ok(password)
    }

    /// Remove the tenant's schema (with all data) and role.
    ///
    /// Names missing from the record are derived from the slug again.
    pub async fn drop_for_tenant(&self, tenant: &Tenant) -> Result<()> {
        let schema = match tenant.schema_name() {
            Some(schema) => schema.to_string(),
            None => {
                warn!("Tenant {} has no stored schema, deriving from slug", tenant.slug);
                schema_name(&tenant.slug)
            }
        };
        let role = match tenant.role_name() {
            Some(role) => role.to_string(),
            None => {
                warn!("Tenant {} has no stored role, deriving from slug", tenant.slug);
                role_name(&tenant.slug)
            }
        };

        if is_reserved_schema(&schema) {
            return Err(TenancyError::Validation(format!(
                "refusing to drop reserved schema '{}' of tenant {}",
                schema, tenant.slug
            )));
        }

        info!(
            "Deprovisioning tenant {} (schema={}, role={})",
            tenant.slug, schema, role
        );
        self.run(drop_statements(&schema, &role)).await
    }

    /// Undo [`create_for_tenant`](Self::create_for_tenant) for a tenant that
    /// could not be saved.
    ///
    /// Drops the role and whatever it owns; a pre-existing schema survives.
    pub async fn rollback_for_tenant(&self, tenant: &Tenant) -> Result<()> {
        let role = match tenant.role_name() {
            Some(role) => role.to_string(),
            None => role_name(&tenant.slug),
        };

        info!("Rolling back provisioning of tenant {} (role={})", tenant.slug, role);
        self.run(rollback_statements(&role)).await
    }

    async fn run(&self, statements: Vec<(ProvisionStep, String)>) -> Result<()> {
        for (step, sql) in statements {
            debug!("Executing {}", step);
            self.admin.execute(&sql).await.map_err(|e| {
                let message = match e {
                    TenancyError::Connection(m) | TenancyError::Storage(m) => m,
                    other => other.to_string(),
                };
                TenancyError::Provisioning { step, message }
            })?;
        }
        Ok(())
    }
}

impl fmt::Debug for SchemaProvisioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaProvisioner").finish_non_exhaustive()
    }
}
