//! Tenant persistence

use crate::error::{Result, TenancyError};
use crate::tenant::Tenant;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;

/// Tenant store trait (implement with your database)
///
/// `slug`, `schema`, `db_username` and a present `domain` are unique.
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Find tenant by ID
    async fn find_by_id(&self, id: i64) -> Result<Option<Tenant>>;

    /// Find tenant by slug
    async fn find_by_slug(&self, slug: &str) -> Result<Option<Tenant>>;

    /// First tenant, by ascending id, whose slug is `slug` or whose domain is `domain`
    async fn find_by_slug_or_domain(&self, slug: &str, domain: &str) -> Result<Option<Tenant>>;

    /// Find tenant by custom domain
    async fn find_by_domain(&self, domain: &str) -> Result<Option<Tenant>>;

    /// Find the tenant owned by a team
    async fn find_by_team(&self, team_id: i64) -> Result<Option<Tenant>>;

    /// Find the tenant whose schema is `schema`
    async fn find_by_schema(&self, schema: &str) -> Result<Option<Tenant>>;

    /// Persist a new tenant and return it with its id and timestamps set
    async fn insert(&self, tenant: Tenant) -> Result<Tenant>;

    /// Save changes to an existing tenant
    async fn update(&self, tenant: Tenant) -> Result<Tenant>;

    /// Delete by ID; deleting a missing tenant is not an error
    async fn delete(&self, id: i64) -> Result<()>;

    /// All tenants ordered by id
    async fn list(&self) -> Result<Vec<Tenant>>;
}

/// In-memory tenant store for testing
///
/// ```
/// # tokio_test::block_on(async {
/// use pgtenancy::{InMemoryTenantStore, Tenant, TenantStore};
///
/// let store = InMemoryTenantStore::new();
/// let saved = store.insert(Tenant::new("acme").with_domain("acme.io")).await.unwrap();
///
/// assert_eq!(saved.id, Some(1));
/// assert!(store.find_by_domain("acme.io").await.unwrap().is_some());
/// # });
/// ```
#[derive(Debug, Default)]
pub struct InMemoryTenantStore {
    tenants: parking_lot::RwLock<BTreeMap<i64, Tenant>>,
    next_id: parking_lot::Mutex<i64>,
}

impl InMemoryTenantStore {
    /// Create new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    fn check_unique(tenants: &BTreeMap<i64, Tenant>, tenant: &Tenant) -> Result<()> {
        for existing in tenants.values() {
            if existing.id == tenant.id {
                continue;
            }
            let clash = if existing.slug == tenant.slug {
                Some("slug")
            } else if tenant.schema.is_some() && existing.schema == tenant.schema {
                Some("schema")
            } else if tenant.db_username.is_some() && existing.db_username == tenant.db_username {
                Some("db_username")
            } else if tenant.domain.is_some() && existing.domain == tenant.domain {
                Some("domain")
            } else {
                None
            };

            if let Some(field) = clash {
                return Err(TenancyError::Storage(format!(
                    "duplicate {} for tenant {}",
                    field, tenant.slug
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TenantStore for InMemoryTenantStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Tenant>> {
        Ok(self.tenants.read().get(&id).cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Tenant>> {
        Ok(self.tenants.read().values().find(|t| t.slug == slug).cloned())
    }

    async fn find_by_slug_or_domain(&self, slug: &str, domain: &str) -> Result<Option<Tenant>> {
        Ok(self
            .tenants
            .read()
            .values()
            .find(|t| t.slug == slug || t.domain.as_deref() == Some(domain))
            .cloned())
    }

    async fn find_by_domain(&self, domain: &str) -> Result<Option<Tenant>> {
        Ok(self
            .tenants
            .read()
            .values()
            .find(|t| t.domain.as_deref() == Some(domain))
            .cloned())
    }

    async fn find_by_team(&self, team_id: i64) -> Result<Option<Tenant>> {
        Ok(self
            .tenants
            .read()
            .values()
            .find(|t| t.team_id == Some(team_id))
            .cloned())
    }

    async fn find_by_schema(&self, schema: &str) -> Result<Option<Tenant>> {
        Ok(self
            .tenants
            .read()
            .values()
            .find(|t| t.schema.as_deref() == Some(schema))
            .cloned())
    }

    async fn insert(&self, mut tenant: Tenant) -> Result<Tenant> {
        let mut tenants = self.tenants.write();
        tenant.id = None;
        Self::check_unique(&tenants, &tenant)?;

        let mut next_id = self.next_id.lock();
        *next_id += 1;

        let now = Utc::now();
        tenant.id = Some(*next_id);
        tenant.created_at = Some(now);
        tenant.updated_at = Some(now);

        tenants.insert(*next_id, tenant.clone());
        Ok(tenant)
    }

    async fn update(&self, mut tenant: Tenant) -> Result<Tenant> {
        let id = tenant
            .id
            .ok_or_else(|| TenancyError::Storage("cannot update an unsaved tenant".to_string()))?;

        let mut tenants = self.tenants.write();
        if !tenants.contains_key(&id) {
            return Err(TenancyError::NotFound(id.to_string()));
        }
        Self::check_unique(&tenants, &tenant)?;

        tenant.updated_at = Some(Utc::now());
        tenants.insert(id, tenant.clone());
        Ok(tenant)
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.tenants.write().remove(&id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Tenant>> {
        Ok(self.tenants.read().values().cloned().collect())
    }
}
