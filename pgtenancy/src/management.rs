//! Tenant Management
//!
//! Explicit orchestration of the tenant lifecycle: provision, persist and
//! notify on create; deprovision, delete and notify on delete.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use pgtenancy::management::*;
//!
//! let manager = TenantManager::new(store, provisioner, events);
//!
//! let created = manager
//!     .create(CreateTenantRequest::new("acme").with_domain("acme.io"))
//!     .await?;
//! println!("role password: {}", created.password);
//!
//! // Teams drive their tenant explicitly
//! let teams = TeamLifecycle::new(manager.clone());
//! teams.team_created(&team).await?;
//! ```

use crate::error::{Result, TenancyError};
use crate::events::{EventSink, NullEventSink, TenantEvent};
use crate::naming::{is_reserved_schema, is_valid_identifier, schema_name};
use crate::schema::SchemaProvisioner;
use crate::store::TenantStore;
use crate::tenant::{Team, Tenant};
use pgtenancy_log::{error, info, warn};
use std::fmt;
use std::sync::Arc;

/// Request to create a new tenant
#[derive(Clone, Default)]
pub struct CreateTenantRequest {
    pub slug: String,
    pub domain: Option<String>,
    /// Explicit schema name instead of the derived one
    pub schema: Option<String>,
    pub team_id: Option<i64>,
    /// Explicit role password instead of a generated one
    pub password: Option<String>,
}

impl CreateTenantRequest {
    /// Create new request
    pub fn new(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            ..Default::default()
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_team(mut self, team_id: i64) -> Self {
        self.team_id = Some(team_id);
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

impl fmt::Debug for CreateTenantRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateTenantRequest")
            .field("slug", &self.slug)
            .field("domain", &self.domain)
            .field("schema", &self.schema)
            .field("team_id", &self.team_id)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// A newly created tenant and its plaintext role password.
///
/// This is the only place the plaintext is ever available.
pub struct ProvisionedTenant {
    pub tenant: Tenant,
    pub password: String,
}

impl fmt::Debug for ProvisionedTenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionedTenant")
            .field("tenant", &self.tenant)
            .field("password", &"***")
            .finish()
    }
}

fn normalize_domain(domain: Option<String>) -> Option<String> {
    domain
        .map(|d| d.trim().to_ascii_lowercase())
        .filter(|d| !d.is_empty())
}

/// Tenant manager
#[derive(Clone)]
pub struct TenantManager {
    store: Arc<dyn TenantStore>,
    provisioner: SchemaProvisioner,
    events: Arc<dyn EventSink>,
}

impl TenantManager {
    /// Create a new tenant manager
    pub fn new(
        store: Arc<dyn TenantStore>,
        provisioner: SchemaProvisioner,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            provisioner,
            events,
        }
    }

    /// Create a tenant manager that publishes nowhere
    pub fn without_events(store: Arc<dyn TenantStore>, provisioner: SchemaProvisioner) -> Self {
        Self::new(store, provisioner, Arc::new(NullEventSink))
    }

    pub fn store(&self) -> &Arc<dyn TenantStore> {
        &self.store
    }

    pub fn provisioner(&self) -> &SchemaProvisioner {
        &self.provisioner
    }

    /// Provision and persist a new tenant.
    ///
    /// If saving fails after the schema was created, the schema and role are
    /// dropped again before the save error is returned.
    pub async fn create(&self, request: CreateTenantRequest) -> Result<ProvisionedTenant> {
        let slug = request.slug.trim().to_string();
        if slug.is_empty() {
            return Err(TenancyError::Validation("slug cannot be empty".to_string()));
        }
        if self.store.find_by_slug(&slug).await?.is_some() {
            return Err(TenancyError::Validation(format!(
                "tenant slug '{}' already exists",
                slug
            )));
        }

        let domain = normalize_domain(request.domain);
        if let Some(ref domain) = domain {
            if self.store.find_by_domain(domain).await?.is_some() {
                return Err(TenancyError::Validation(format!(
                    "domain '{}' is already assigned",
                    domain
                )));
            }
        }

        let mut tenant = Tenant::new(slug);
        tenant.domain = domain;

        let schema = match request.schema.filter(|s| !s.trim().is_empty()) {
            Some(schema) => {
                if !is_valid_identifier(&schema) {
                    return Err(TenancyError::Validation(format!(
                        "'{}' is not a valid schema name",
                        schema
                    )));
                }
                if is_reserved_schema(&schema) {
                    return Err(TenancyError::Validation(format!(
                        "schema '{}' is reserved",
                        schema
                    )));
                }
                schema
            }
            None => schema_name(&tenant.slug),
        };
        if let Some(owner) = self.store.find_by_schema(&schema).await? {
            return Err(TenancyError::Validation(format!(
                "schema '{}' already belongs to tenant {}",
                schema, owner.slug
            )));
        }
        tenant.schema = Some(schema);

        if let Some(team_id) = request.team_id {
            if self.store.find_by_team(team_id).await?.is_some() {
                return Err(TenancyError::Validation(format!(
                    "team {} already has a tenant",
                    team_id
                )));
            }
            tenant.team_id = Some(team_id);
        }

        let password = self
            .provisioner
            .create_for_tenant(&mut tenant, request.password.as_deref())
            .await?;

        let tenant = match self.store.insert(tenant.clone()).await {
            Ok(saved) => saved,
            Err(e) => {
                warn!("Saving tenant {} failed, rolling back its role: {}", tenant.slug, e);
                if let Err(rollback_err) = self.provisioner.rollback_for_tenant(&tenant).await {
                    error!(
                        "Rollback of tenant {} failed, manual cleanup required: {}",
                        tenant.slug, rollback_err
                    );
                }
                return Err(e);
            }
        };

        info!("Created tenant {}", tenant.label());
        self.events.publish(TenantEvent::created(tenant.clone())).await;

        Ok(ProvisionedTenant { tenant, password })
    }

    /// Find by numeric id, falling back to slug
    pub async fn find(&self, id_or_slug: &str) -> Result<Option<Tenant>> {
        let key = id_or_slug.trim();
        if let Ok(id) = key.parse::<i64>() {
            if let Some(tenant) = self.store.find_by_id(id).await? {
                return Ok(Some(tenant));
            }
        }
        self.store.find_by_slug(key).await
    }

    async fn require(&self, id_or_slug: &str) -> Result<Tenant> {
        self.find(id_or_slug)
            .await?
            .ok_or_else(|| TenancyError::NotFound(id_or_slug.to_string()))
    }

    /// Deprovision and delete a tenant; returns the deleted record
    pub async fn delete(&self, id_or_slug: &str) -> Result<Tenant> {
        let tenant = self.require(id_or_slug).await?;
        self.remove(tenant).await
    }

    async fn remove(&self, tenant: Tenant) -> Result<Tenant> {
        self.provisioner.drop_for_tenant(&tenant).await?;

        if let Some(id) = tenant.id {
            self.store.delete(id).await?;
        }

        info!("Deleted tenant {}", tenant.label());
        self.events.publish(TenantEvent::deleted(tenant.clone())).await;
        Ok(tenant)
    }

    /// Set or remove the custom domain
    pub async fn update_domain(&self, id_or_slug: &str, domain: Option<String>) -> Result<Tenant> {
        let mut tenant = self.require(id_or_slug).await?;
        let domain = normalize_domain(domain);

        if let Some(ref domain) = domain {
            if let Some(other) = self.store.find_by_domain(domain).await? {
                if other.id != tenant.id {
                    return Err(TenancyError::Validation(format!(
                        "domain '{}' is already assigned",
                        domain
                    )));
                }
            }
        }

        tenant.domain = domain;
        self.save(tenant).await
    }

    /// Set or remove the owning team
    pub async fn assign_team(&self, id_or_slug: &str, team_id: Option<i64>) -> Result<Tenant> {
        let mut tenant = self.require(id_or_slug).await?;

        if let Some(team_id) = team_id {
            if let Some(other) = self.store.find_by_team(team_id).await? {
                if other.id != tenant.id {
                    return Err(TenancyError::Validation(format!(
                        "team {} already has a tenant",
                        team_id
                    )));
                }
            }
        }

        tenant.team_id = team_id;
        self.save(tenant).await
    }

    async fn save(&self, tenant: Tenant) -> Result<Tenant> {
        let tenant = self.store.update(tenant).await?;
        self.events.publish(TenantEvent::updated(tenant.clone())).await;
        Ok(tenant)
    }

    /// All tenants
    pub async fn list(&self) -> Result<Vec<Tenant>> {
        self.store.list().await
    }
}

impl fmt::Debug for TenantManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantManager").finish_non_exhaustive()
    }
}

/// Tenant side of team lifecycle changes.
///
/// Code that creates, updates or deletes a team calls the matching method.
#[derive(Clone, Debug)]
pub struct TeamLifecycle {
    manager: TenantManager,
}

impl TeamLifecycle {
    pub fn new(manager: TenantManager) -> Self {
        Self { manager }
    }

    /// Provision the team's tenant unless it already has one
    pub async fn team_created(&self, team: &Team) -> Result<Tenant> {
        if let Some(existing) = self.manager.store.find_by_team(team.id).await? {
            return Ok(existing);
        }

        let request = CreateTenantRequest::new(team.tenant_slug()).with_team(team.id);
        Ok(self.manager.create(request).await?.tenant)
    }

    /// Announce the team's tenant as updated; names never change
    pub async fn team_updated(&self, team: &Team) -> Result<Option<Tenant>> {
        let tenant = self.manager.store.find_by_team(team.id).await?;
        if let Some(ref tenant) = tenant {
            self.manager
                .events
                .publish(TenantEvent::updated(tenant.clone()))
                .await;
        }
        Ok(tenant)
    }

    /// Deprovision and delete the team's tenant, if any
    pub async fn team_deleted(&self, team: &Team) -> Result<Option<Tenant>> {
        match self.manager.store.find_by_team(team.id).await? {
            Some(tenant) => self.manager.remove(tenant).await.map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialCipher;
    use crate::events::{BroadcastEventSink, TenantEventKind};
    use crate::schema::AdminConnection;
    use crate::store::InMemoryTenantStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingAdmin {
        statements: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AdminConnection for RecordingAdmin {
        async fn execute(&self, sql: &str) -> Result<()> {
            self.statements.lock().push(sql.to_string());
            Ok(())
        }
    }

    struct FailingInsertStore {
        inner: InMemoryTenantStore,
    }

    #[async_trait]
    impl TenantStore for FailingInsertStore {
        async fn find_by_id(&self, id: i64) -> Result<Option<Tenant>> {
            self.inner.find_by_id(id).await
        }
        async fn find_by_slug(&self, slug: &str) -> Result<Option<Tenant>> {
            self.inner.find_by_slug(slug).await
        }
        async fn find_by_slug_or_domain(&self, slug: &str, domain: &str) -> Result<Option<Tenant>> {
            self.inner.find_by_slug_or_domain(slug, domain).await
        }
        async fn find_by_domain(&self, domain: &str) -> Result<Option<Tenant>> {
            self.inner.find_by_domain(domain).await
        }
        async fn find_by_team(&self, team_id: i64) -> Result<Option<Tenant>> {
            self.inner.find_by_team(team_id).await
        }
        async fn find_by_schema(&self, schema: &str) -> Result<Option<Tenant>> {
            self.inner.find_by_schema(schema).await
        }
        async fn insert(&self, _tenant: Tenant) -> Result<Tenant> {
            Err(TenancyError::Storage("disk full".to_string()))
        }
        async fn update(&self, tenant: Tenant) -> Result<Tenant> {
            self.inner.update(tenant).await
        }
        async fn delete(&self, id: i64) -> Result<()> {
            self.inner.delete(id).await
        }
        async fn list(&self) -> Result<Vec<Tenant>> {
            self.inner.list().await
        }
    }

    struct Fixture {
        manager: TenantManager,
        admin: Arc<RecordingAdmin>,
        events: BroadcastEventSink,
    }

    fn fixture_with(store: Arc<dyn TenantStore>) -> Fixture {
        let admin = Arc::new(RecordingAdmin::default());
        let provisioner = SchemaProvisioner::new(admin.clone(), CredentialCipher::new([2u8; 32]));
        let events = BroadcastEventSink::new(16);
        let manager = TenantManager::new(store, provisioner, Arc::new(events.clone()));
        Fixture {
            manager,
            admin,
            events,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(InMemoryTenantStore::new()))
    }

    #[tokio::test]
    async fn test_create_tenant() {
        let fx = fixture();
        let mut events = fx.events.subscribe();

        let created = fx
            .manager
            .create(CreateTenantRequest::new("acme").with_domain("ACME.io"))
            .await
            .unwrap();

        assert_eq!(created.tenant.id, Some(1));
        assert_eq!(created.tenant.schema.as_deref(), Some("t_acme"));
        assert_eq!(created.tenant.domain.as_deref(), Some("acme.io"));
        assert_eq!(created.password.len(), 32);
        assert!(!format!("{:?}", created).contains(&created.password));
        assert_eq!(fx.admin.statements.lock().len(), 5);

        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, TenantEventKind::Created);
        assert_eq!(event.tenant.slug, "acme");
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates() {
        let fx = fixture();
        fx.manager
            .create(CreateTenantRequest::new("acme").with_domain("acme.io").with_team(1))
            .await
            .unwrap();

        for request in [
            CreateTenantRequest::new("acme"),
            CreateTenantRequest::new("other").with_domain("acme.io"),
            CreateTenantRequest::new("other").with_team(1),
            CreateTenantRequest::new(""),
        ] {
            let err = fx.manager.create(request).await.unwrap_err();
            assert!(matches!(err, TenancyError::Validation(_)));
        }
        assert_eq!(fx.admin.statements.lock().len(), 5);
    }

    #[tokio::test]
    async fn test_create_with_explicit_schema() {
        let fx = fixture();
        let created = fx
            .manager
            .create(CreateTenantRequest::new("acme").with_schema("acme_data").with_password("pw"))
            .await
            .unwrap();

        assert_eq!(created.tenant.schema.as_deref(), Some("acme_data"));
        assert_eq!(created.tenant.db_username.as_deref(), Some("u_acme"));
        assert_eq!(created.password, "pw");

        let err = fx
            .manager
            .create(CreateTenantRequest::new("bad").with_schema("Bad; DROP"))
            .await
            .unwrap_err();
        assert!(matches!(err, TenancyError::Validation(_)));
    }

    #[tokio::test]
    async fn test_failed_save_rolls_back_role() {
        let fx = fixture_with(Arc::new(FailingInsertStore {
            inner: InMemoryTenantStore::new(),
        }));

        let err = fx.manager.create(CreateTenantRequest::new("acme")).await.unwrap_err();
        assert!(matches!(err, TenancyError::Storage(_)));

        let statements = fx.admin.statements.lock();
        assert_eq!(statements.len(), 7);
        assert_eq!(statements[5], "DROP OWNED BY \"u_acme\";");
        assert_eq!(statements[6], "DROP ROLE IF EXISTS \"u_acme\";");
        assert!(!statements.iter().any(|sql| sql.starts_with("DROP SCHEMA")));
    }

    #[tokio::test]
    async fn test_create_rejects_schema_of_another_tenant() {
        let fx = fixture();
        fx.manager
            .create(CreateTenantRequest::new("acme").with_schema("shared"))
            .await
            .unwrap();

        let err = fx
            .manager
            .create(CreateTenantRequest::new("beta").with_schema("shared"))
            .await
            .unwrap_err();
        assert!(matches!(err, TenancyError::Validation(ref m) if m.contains("acme")));

        // A derived name clashing with an explicit one is caught the same way.
        fx.manager
            .create(CreateTenantRequest::new("gamma").with_schema("t_delta"))
            .await
            .unwrap();
        let err = fx
            .manager
            .create(CreateTenantRequest::new("delta"))
            .await
            .unwrap_err();
        assert!(matches!(err, TenancyError::Validation(ref m) if m.contains("gamma")));

        {
            let statements = fx.admin.statements.lock();
            assert_eq!(statements.len(), 10);
            assert!(!statements.iter().any(|sql| sql.contains("DROP")));
        }
        assert_eq!(
            fx.manager.find("acme").await.unwrap().unwrap().schema.as_deref(),
            Some("shared")
        );
    }

    #[tokio::test]
    async fn test_create_rejects_reserved_schema() {
        let fx = fixture();

        for schema in ["public", "information_schema", "pg_catalog", "pg_temp_1"] {
            let err = fx
                .manager
                .create(CreateTenantRequest::new("acme").with_schema(schema))
                .await
                .unwrap_err();
            assert!(matches!(err, TenancyError::Validation(_)), "{schema}");
        }
        assert!(fx.admin.statements.lock().is_empty());
        assert!(fx.manager.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_by_id_or_slug() {
        let fx = fixture();
        fx.manager.create(CreateTenantRequest::new("acme")).await.unwrap();
        fx.manager.create(CreateTenantRequest::new("beta")).await.unwrap();
        let mut events = fx.events.subscribe();

        let deleted = fx.manager.delete("1").await.unwrap();
        assert_eq!(deleted.slug, "acme");
        fx.manager.delete("beta").await.unwrap();

        assert!(fx.manager.list().await.unwrap().is_empty());
        assert_eq!(events.recv().await.unwrap().kind, TenantEventKind::Deleted);
        assert!(fx.manager.delete("acme").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_numeric_slug_lookup() {
        let fx = fixture();
        fx.manager.create(CreateTenantRequest::new("42")).await.unwrap();

        let found = fx.manager.find("42").await.unwrap().unwrap();
        assert_eq!(found.slug, "42");
    }

    #[tokio::test]
    async fn test_update_domain_and_team() {
        let fx = fixture();
        fx.manager.create(CreateTenantRequest::new("acme")).await.unwrap();
        fx.manager
            .create(CreateTenantRequest::new("beta").with_domain("beta.io").with_team(2))
            .await
            .unwrap();

        let updated = fx.manager.update_domain("acme", Some("acme.io".into())).await.unwrap();
        assert_eq!(updated.domain.as_deref(), Some("acme.io"));
        assert!(fx.manager.update_domain("acme", Some("beta.io".into())).await.is_err());

        let updated = fx.manager.assign_team("acme", Some(1)).await.unwrap();
        assert_eq!(updated.team_id, Some(1));
        assert!(fx.manager.assign_team("acme", Some(2)).await.is_err());

        let cleared = fx.manager.update_domain("acme", None).await.unwrap();
        assert_eq!(cleared.domain, None);
        assert_eq!(cleared.schema.as_deref(), Some("t_acme"));
    }

    #[tokio::test]
    async fn test_team_lifecycle() {
        let fx = fixture();
        let teams = TeamLifecycle::new(fx.manager.clone());
        let mut events = fx.events.subscribe();

        let team = Team::new(7).with_slug("Acme Team");
        let tenant = teams.team_created(&team).await.unwrap();
        assert_eq!(tenant.slug, "Acme Team");
        assert_eq!(tenant.schema.as_deref(), Some("t_acme_team"));
        assert_eq!(tenant.team_id, Some(7));

        let again = teams.team_created(&team).await.unwrap();
        assert_eq!(again.id, tenant.id);
        assert_eq!(fx.admin.statements.lock().len(), 5);

        let updated = teams.team_updated(&team.clone().with_name("Renamed")).await.unwrap();
        assert_eq!(updated.unwrap().schema, tenant.schema);

        let deleted = teams.team_deleted(&team).await.unwrap();
        assert_eq!(deleted.unwrap().id, tenant.id);
        assert!(teams.team_deleted(&team).await.unwrap().is_none());

        let kinds: Vec<TenantEventKind> = vec![
            events.recv().await.unwrap().kind,
            events.recv().await.unwrap().kind,
            events.recv().await.unwrap().kind,
        ];
        assert_eq!(
            kinds,
            vec![
                TenantEventKind::Created,
                TenantEventKind::Updated,
                TenantEventKind::Deleted
            ]
        );
    }

    #[tokio::test]
    async fn test_team_without_slug_uses_id() {
        let fx = fixture();
        let teams = TeamLifecycle::new(fx.manager.clone());

        let tenant = teams.team_created(&Team::new(15)).await.unwrap();
        assert_eq!(tenant.slug, "15");
        assert_eq!(tenant.db_username.as_deref(), Some("u_15"));
    }
}
