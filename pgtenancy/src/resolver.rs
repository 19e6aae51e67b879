//! Tenant Resolution
//!
//! Strategies for mapping an inbound request to a tenant. Exactly one is
//! chosen from configuration when the application starts.

use crate::error::{Result, TenancyError};
use crate::store::TenantStore;
use crate::tenant::Tenant;
use async_trait::async_trait;
use pgtenancy_config::{TenancyConfig, TenancyMode};
use pgtenancy_log::trace;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Identity already established by the host application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub current_team_id: Option<i64>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            current_team_id: None,
        }
    }

    pub fn with_current_team(mut self, team_id: i64) -> Self {
        self.current_team_id = Some(team_id);
        self
    }
}

/// The parts of a request that resolution looks at
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    /// Host name, possibly with a port
    pub host: String,
    /// URL path, possibly with a query string
    pub path: String,
    pub identity: Option<Identity>,
}

impl RequestDescriptor {
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            path: path.into(),
            identity: None,
        }
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }
}

/// Tenant resolver trait
///
/// `Ok(None)` means unresolved; the caller decides what that implies.
/// Resolution never modifies tenants.
#[async_trait]
pub trait TenantResolver: Send + Sync {
    /// Resolve tenant from request
    async fn resolve(&self, request: &RequestDescriptor) -> Result<Option<Tenant>>;
}

/// Lower-case host with any port and trailing dot removed
fn normalize_host(host: &str) -> String {
    let host = host.trim().to_ascii_lowercase();
    if host.starts_with('[') {
        if let Some(end) = host.find(']') {
            return host[..=end].to_string();
        }
    }
    let host = match host.rsplit_once(':') {
        Some((name, port))
            if !name.contains(':') && !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) =>
        {
            name.to_string()
        }
        _ => host,
    };
    host.trim_end_matches('.').to_string()
}

/// Subdomain-based tenant resolver
///
/// `acme.example.com` resolves by slug `acme` or by domain
/// `acme.example.com`. Hosts outside the base domain resolve by custom
/// domain only.
pub struct SubdomainTenantResolver {
    store: Arc<dyn TenantStore>,
    base_domain: String,
}

impl SubdomainTenantResolver {
    /// Create new subdomain-based resolver
    ///
    /// # Examples
    ///
    /// ```
    /// use pgtenancy::{InMemoryTenantStore, SubdomainTenantResolver, TenantStore};
    /// use std::sync::Arc;
    ///
    /// let store: Arc<dyn TenantStore> = Arc::new(InMemoryTenantStore::new());
    /// let resolver = SubdomainTenantResolver::new(store, "example.com");
    /// ```
    pub fn new(store: Arc<dyn TenantStore>, base_domain: impl Into<String>) -> Self {
        Self {
            store,
            base_domain: normalize_host(&base_domain.into()).trim_start_matches('.').to_string(),
        }
    }

    /// Candidate slug: the label just left of the base domain
    fn extract_subdomain<'a>(&self, host: &'a str) -> Option<&'a str> {
        let left = host.strip_suffix(&self.base_domain)?.strip_suffix('.')?;
        left.rsplit('.').next().filter(|label| !label.is_empty())
    }

    fn is_under_base(&self, host: &str) -> bool {
        host == self.base_domain || host.ends_with(&format!(".{}", self.base_domain))
    }
}

#[async_trait]
impl TenantResolver for SubdomainTenantResolver {
    async fn resolve(&self, request: &RequestDescriptor) -> Result<Option<Tenant>> {
        let host = normalize_host(&request.host);
        if host.is_empty() || self.base_domain.is_empty() {
            return Ok(None);
        }

        if !self.is_under_base(&host) {
            trace!("Host {} is outside {}, trying custom domain", host, self.base_domain);
            return self.store.find_by_domain(&host).await;
        }

        match self.extract_subdomain(&host) {
            Some(slug) => self.store.find_by_slug_or_domain(slug, &host).await,
            None => Ok(None),
        }
    }
}

/// Path-based tenant resolver
///
/// With index 1, `/acme/dashboard` resolves to slug `acme`.
pub struct PathTenantResolver {
    store: Arc<dyn TenantStore>,
    segment_index: usize,
}

impl PathTenantResolver {
    /// Create new path-based resolver; `segment_index` is 1-based
    ///
    /// # Examples
    ///
    /// ```
    /// use pgtenancy::{InMemoryTenantStore, PathTenantResolver, TenantStore};
    /// use std::sync::Arc;
    ///
    /// let store: Arc<dyn TenantStore> = Arc::new(InMemoryTenantStore::new());
    /// let resolver = PathTenantResolver::new(store, 1);
    /// ```
    pub fn new(store: Arc<dyn TenantStore>, segment_index: usize) -> Self {
        Self {
            store,
            segment_index,
        }
    }

    fn extract_segment<'a>(&self, path: &'a str) -> Option<&'a str> {
        let index = self.segment_index.checked_sub(1)?;
        let path = path.split(['?', '#']).next().unwrap_or_default().trim_matches('/');
        if path.is_empty() {
            return None;
        }
        path.split('/').nth(index).filter(|segment| !segment.is_empty())
    }
}

#[async_trait]
impl TenantResolver for PathTenantResolver {
    async fn resolve(&self, request: &RequestDescriptor) -> Result<Option<Tenant>> {
        match self.extract_segment(&request.path) {
            Some(slug) => self.store.find_by_slug(slug).await,
            None => Ok(None),
        }
    }
}

/// Team-based tenant resolver
///
/// Resolves the tenant owned by the authenticated user's current team.
pub struct TeamTenantResolver {
    store: Arc<dyn TenantStore>,
}

impl TeamTenantResolver {
    pub fn new(store: Arc<dyn TenantStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TenantResolver for TeamTenantResolver {
    async fn resolve(&self, request: &RequestDescriptor) -> Result<Option<Tenant>> {
        let team_id = match request.identity.as_ref().and_then(|i| i.current_team_id) {
            Some(team_id) => team_id,
            None => return Ok(None),
        };
        self.store.find_by_team(team_id).await
    }
}

/// Build the resolver for the configured mode
pub fn resolver_for_mode(
    config: &TenancyConfig,
    store: Arc<dyn TenantStore>,
) -> Result<Arc<dyn TenantResolver>> {
    let resolver: Arc<dyn TenantResolver> = match config.mode {
        TenancyMode::Subdomain => {
            let base_domain = config
                .base_domain
                .as_deref()
                .filter(|d| !d.trim().is_empty())
                .ok_or_else(|| {
                    TenancyError::configuration("base_domain", "is required in subdomain mode")
                })?;
            Arc::new(SubdomainTenantResolver::new(store, base_domain))
        }
        TenancyMode::Path => {
            if config.path_segment_index == 0 {
                return Err(TenancyError::configuration(
                    "path_segment_index",
                    "must be at least 1",
                ));
            }
            Arc::new(PathTenantResolver::new(store, config.path_segment_index))
        }
        TenancyMode::Team => Arc::new(TeamTenantResolver::new(store)),
    };
    Ok(resolver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MockTenantStore {
        tenants: HashMap<i64, Tenant>,
    }

    impl MockTenantStore {
        fn new() -> Self {
            let mut tenants = HashMap::new();
            tenants.insert(1, Tenant::new("acme").with_id(1).with_team(10));
            tenants.insert(2, Tenant::new("globex").with_id(2).with_domain("custom.io"));
            Self { tenants }
        }

        fn sorted(&self) -> Vec<&Tenant> {
            let mut tenants: Vec<&Tenant> = self.tenants.values().collect();
            tenants.sort_by_key(|t| t.id);
            tenants
        }
    }

    #[async_trait]
    impl TenantStore for MockTenantStore {
        async fn find_by_id(&self, id: i64) -> Result<Option<Tenant>> {
            Ok(self.tenants.get(&id).cloned())
        }

        async fn find_by_slug(&self, slug: &str) -> Result<Option<Tenant>> {
            Ok(self.sorted().into_iter().find(|t| t.slug == slug).cloned())
        }

        async fn find_by_slug_or_domain(&self, slug: &str, domain: &str) -> Result<Option<Tenant>> {
            Ok(self
                .sorted()
                .into_iter()
                .find(|t| t.slug == slug || t.domain.as_deref() == Some(domain))
                .cloned())
        }

        async fn find_by_domain(&self, domain: &str) -> Result<Option<Tenant>> {
            Ok(self
                .sorted()
                .into_iter()
                .find(|t| t.domain.as_deref() == Some(domain))
                .cloned())
        }

        async fn find_by_team(&self, team_id: i64) -> Result<Option<Tenant>> {
            Ok(self
                .sorted()
                .into_iter()
                .find(|t| t.team_id == Some(team_id))
                .cloned())
        }

        async fn find_by_schema(&self, schema: &str) -> Result<Option<Tenant>> {
            Ok(self
                .sorted()
                .into_iter()
                .find(|t| t.schema.as_deref() == Some(schema))
                .cloned())
        }

        async fn insert(&self, tenant: Tenant) -> Result<Tenant> {
            Ok(tenant)
        }

        async fn update(&self, tenant: Tenant) -> Result<Tenant> {
            Ok(tenant)
        }

        async fn delete(&self, _id: i64) -> Result<()> {
            Ok(())
        }

        async fn list(&self) -> Result<Vec<Tenant>> {
            Ok(self.sorted().into_iter().cloned().collect())
        }
    }

    fn store() -> Arc<dyn TenantStore> {
        Arc::new(MockTenantStore::new())
    }

    async fn slug_for(resolver: &dyn TenantResolver, request: RequestDescriptor) -> Option<String> {
        resolver.resolve(&request).await.unwrap().map(|t| t.slug)
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("ACME.Example.com:8080"), "acme.example.com");
        assert_eq!(normalize_host("acme.example.com."), "acme.example.com");
        assert_eq!(normalize_host("[::1]:8080"), "[::1]");
    }

    #[tokio::test]
    async fn test_subdomain_resolver() {
        let resolver = SubdomainTenantResolver::new(store(), "example.com");

        let request = RequestDescriptor::new("acme.example.com", "/");
        assert_eq!(slug_for(&resolver, request).await.as_deref(), Some("acme"));

        let request = RequestDescriptor::new("www.acme.example.com:443", "/");
        assert_eq!(slug_for(&resolver, request).await.as_deref(), Some("acme"));
    }

    #[tokio::test]
    async fn test_subdomain_resolver_unresolved() {
        let resolver = SubdomainTenantResolver::new(store(), "example.com");

        for host in ["other.org", "example.com", "nobody.example.com", "notexample.com", ""] {
            let request = RequestDescriptor::new(host, "/");
            assert_eq!(slug_for(&resolver, request).await, None, "{host}");
        }
    }

    #[tokio::test]
    async fn test_subdomain_resolver_custom_domain() {
        let resolver = SubdomainTenantResolver::new(store(), "example.com");

        let request = RequestDescriptor::new("custom.io", "/");
        assert_eq!(slug_for(&resolver, request).await.as_deref(), Some("globex"));
    }

    #[tokio::test]
    async fn test_path_resolver() {
        let resolver = PathTenantResolver::new(store(), 1);

        let request = RequestDescriptor::new("app.test", "/acme/dashboard");
        assert_eq!(slug_for(&resolver, request).await.as_deref(), Some("acme"));

        let request = RequestDescriptor::new("app.test", "acme?tab=1");
        assert_eq!(slug_for(&resolver, request).await.as_deref(), Some("acme"));

        for path in ["/", "", "/unknown/x"] {
            let request = RequestDescriptor::new("app.test", path);
            assert_eq!(slug_for(&resolver, request).await, None, "{path}");
        }
    }

    #[tokio::test]
    async fn test_path_resolver_index() {
        let resolver = PathTenantResolver::new(store(), 2);
        let request = RequestDescriptor::new("app.test", "/t/globex/users");
        assert_eq!(slug_for(&resolver, request).await.as_deref(), Some("globex"));

        let request = RequestDescriptor::new("app.test", "/t");
        assert_eq!(slug_for(&resolver, request).await, None);

        let request = RequestDescriptor::new("app.test", "/t//users");
        assert_eq!(slug_for(&resolver, request).await, None);

        let resolver = PathTenantResolver::new(store(), 0);
        let request = RequestDescriptor::new("app.test", "/acme");
        assert_eq!(slug_for(&resolver, request).await, None);
    }

    #[tokio::test]
    async fn test_team_resolver() {
        let resolver = TeamTenantResolver::new(store());

        let anonymous = RequestDescriptor::new("app.test", "/");
        assert_eq!(slug_for(&resolver, anonymous).await, None);

        let no_team = RequestDescriptor::new("app.test", "/").with_identity(Identity::new("u1"));
        assert_eq!(slug_for(&resolver, no_team).await, None);

        let other_team = RequestDescriptor::new("app.test", "/")
            .with_identity(Identity::new("u1").with_current_team(99));
        assert_eq!(slug_for(&resolver, other_team).await, None);

        let member = RequestDescriptor::new("app.test", "/")
            .with_identity(Identity::new("u1").with_current_team(10));
        assert_eq!(slug_for(&resolver, member).await.as_deref(), Some("acme"));
    }

    #[tokio::test]
    async fn test_resolver_for_mode() {
        let mut config = TenancyConfig {
            mode: TenancyMode::Subdomain,
            ..TenancyConfig::default()
        };
        let err = resolver_for_mode(&config, store()).err().unwrap();
        assert!(matches!(err, TenancyError::Configuration { ref key, .. } if key == "base_domain"));

        config.base_domain = Some("example.com".to_string());
        let resolver = resolver_for_mode(&config, store()).unwrap();
        let request = RequestDescriptor::new("acme.example.com", "/");
        assert_eq!(slug_for(resolver.as_ref(), request).await.as_deref(), Some("acme"));

        config.mode = TenancyMode::Path;
        let resolver = resolver_for_mode(&config, store()).unwrap();
        let request = RequestDescriptor::new("x", "/acme");
        assert_eq!(slug_for(resolver.as_ref(), request).await.as_deref(), Some("acme"));
    }
}
