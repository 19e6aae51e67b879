//! Request binding
//!
//! [`TenantGate`] runs once per inbound request: resolve the tenant, bind a
//! fresh [`TenancyContext`] to it, run the handler, clear the context.

use crate::context::{ConnectionFactory, TenancyContext, TenancyManager};
use crate::error::{Result, TenancyError};
use crate::resolver::{RequestDescriptor, TenantResolver, resolver_for_mode};
use crate::store::TenantStore;
use pgtenancy_log::{debug, warn};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Tenant gate
pub struct TenantGate<F: ConnectionFactory> {
    resolver: Arc<dyn TenantResolver>,
    manager: TenancyManager<F>,
    forbid_unresolved: bool,
}

impl<F: ConnectionFactory> TenantGate<F> {
    /// Create new gate; unresolved requests continue untenanted
    pub fn new(resolver: Arc<dyn TenantResolver>, manager: TenancyManager<F>) -> Self {
        Self {
            resolver,
            manager,
            forbid_unresolved: false,
        }
    }

    /// Gate with the resolver and policy from the manager's configuration
    pub fn from_config(manager: TenancyManager<F>, store: Arc<dyn TenantStore>) -> Result<Self> {
        let resolver = resolver_for_mode(manager.config(), store)?;
        let forbid_unresolved = manager.config().forbid_unresolved;
        Ok(Self::new(resolver, manager).with_forbid_unresolved(forbid_unresolved))
    }

    /// Reject requests that resolve to no tenant
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let gate = TenantGate::new(resolver, manager)
    ///     .with_forbid_unresolved(true);
    /// ```
    pub fn with_forbid_unresolved(mut self, forbid: bool) -> Self {
        self.forbid_unresolved = forbid;
        self
    }

    pub fn forbids_unresolved(&self) -> bool {
        self.forbid_unresolved
    }

    /// Resolve and activate the request's tenant.
    ///
    /// An unresolved request yields an empty context, or `NotFound` when
    /// unresolved requests are forbidden.
    pub async fn bind(&self, request: &RequestDescriptor) -> Result<TenancyContext<F>> {
        let mut context = self.manager.begin();

        match self.resolver.resolve(request).await? {
            Some(tenant) => {
                debug!("Resolved tenant {} for {}{}", tenant.slug, request.host, request.path);
                context.initialize_for_tenant(tenant).await?;
            }
            None if self.forbid_unresolved => {
                return Err(TenancyError::NotFound(format!(
                    "no tenant for {}{}",
                    request.host, request.path
                )));
            }
            None => {
                debug!("No tenant for {}{}, using shared connection", request.host, request.path);
            }
        }

        Ok(context)
    }

    /// Run `handler` inside the request's tenancy context.
    ///
    /// The context is cleared after the handler returns, whether or not it
    /// succeeded.
    pub async fn handle<T, E, H>(&self, request: &RequestDescriptor, handler: H) -> std::result::Result<T, E>
    where
        E: From<TenancyError>,
        H: for<'c> FnOnce(
            &'c mut TenancyContext<F>,
        ) -> Pin<Box<dyn Future<Output = std::result::Result<T, E>> + Send + 'c>>,
    {
        let mut context = self.bind(request).await?;

        let result = handler(&mut context).await;

        match context.clear().await {
            Ok(()) => result,
            Err(e) if result.is_ok() => Err(e.into()),
            Err(e) => {
                warn!("Clearing tenancy context after failed request: {}", e);
                result
            }
        }
    }
}
