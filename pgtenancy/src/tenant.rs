//! Tenant and team records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tenant: one schema plus one role in the shared database.
///
/// `db_password` only ever holds ciphertext produced by
/// [`CredentialCipher`](crate::credentials::CredentialCipher).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tenant {
    /// Assigned by the store on insert
    pub id: Option<i64>,

    /// Globally unique, used for lookup and name derivation
    pub slug: String,

    pub schema: Option<String>,

    pub db_username: Option<String>,

    /// Encrypted role password, never serialized
    #[serde(skip_serializing)]
    pub db_password: Option<String>,

    /// Custom host name, unique when present
    pub domain: Option<String>,

    /// Owning team, for team-based resolution
    pub team_id: Option<i64>,

    pub created_at: Option<DateTime<Utc>>,

    pub updated_at: Option<DateTime<Utc>>,
}

impl Tenant {
    /// Create a new, unsaved tenant
    ///
    /// # Examples
    ///
    /// ```
    /// use pgtenancy::Tenant;
    ///
    /// let tenant = Tenant::new("acme").with_domain("acme.io");
    /// assert_eq!(tenant.slug, "acme");
    /// assert!(tenant.id.is_none());
    /// ```
    pub fn new(slug: impl Into<String>) -> Self {
        Self {
            id: None,
            slug: slug.into(),
            schema: None,
            db_username: None,
            db_password: None,
            domain: None,
            team_id: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_db_username(mut self, username: impl Into<String>) -> Self {
        self.db_username = Some(username.into());
        self
    }

    pub fn with_team(mut self, team_id: i64) -> Self {
        self.team_id = Some(team_id);
        self
    }

    /// Schema name, if assigned and non-empty
    pub fn schema_name(&self) -> Option<&str> {
        self.schema.as_deref().filter(|s| !s.is_empty())
    }

    /// Role name, if assigned and non-empty
    pub fn role_name(&self) -> Option<&str> {
        self.db_username.as_deref().filter(|s| !s.is_empty())
    }

    /// Whether schema, role and password have all been assigned
    pub fn is_provisioned(&self) -> bool {
        self.schema_name().is_some()
            && self.role_name().is_some()
            && self.db_password.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// Id when saved, slug otherwise; for messages
    pub fn label(&self) -> String {
        match self.id {
            Some(id) => format!("{} (#{})", self.slug, id),
            None => self.slug.clone(),
        }
    }
}

/// A team owning at most one tenant.
///
/// Membership and ownership live outside this crate; only the id and slug are
/// needed here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Team {
    pub id: i64,
    pub slug: Option<String>,
    pub name: Option<String>,
}

impl Team {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            slug: None,
            name: None,
        }
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Slug for the team's tenant: the team slug, or the id when it has none
    pub fn tenant_slug(&self) -> String {
        match self.slug.as_deref().map(str::trim) {
            Some(slug) if !slug.is_empty() => slug.to_string(),
            _ => self.id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_builder() {
        let tenant = Tenant::new("acme")
            .with_id(7)
            .with_domain("acme.io")
            .with_schema("t_acme")
            .with_db_username("u_acme")
            .with_team(3);

        assert_eq!(tenant.domain.as_deref(), Some("acme.io"));
        assert_eq!(tenant.schema_name(), Some("t_acme"));
        assert_eq!(tenant.role_name(), Some("u_acme"));
        assert_eq!(tenant.team_id, Some(3));
        assert_eq!(tenant.label(), "acme (#7)");
    }

    #[test]
    fn test_empty_names_are_unassigned() {
        let tenant = Tenant::new("acme").with_schema("").with_db_username("");
        assert_eq!(tenant.schema_name(), None);
        assert_eq!(tenant.role_name(), None);
        assert!(!tenant.is_provisioned());
    }

    #[test]
    fn test_is_provisioned() {
        let mut tenant = Tenant::new("acme").with_schema("t_acme").with_db_username("u_acme");
        assert!(!tenant.is_provisioned());

        tenant.db_password = Some("ciphertext".to_string());
        assert!(tenant.is_provisioned());
    }

    #[test]
    fn test_team_tenant_slug() {
        assert_eq!(Team::new(42).with_slug("acme").tenant_slug(), "acme");
        assert_eq!(Team::new(42).tenant_slug(), "42");
        assert_eq!(Team::new(42).with_slug("  ").tenant_slug(), "42");
    }

    #[test]
    fn test_serialized_tenant_omits_password() {
        let mut tenant = Tenant::new("acme").with_schema("t_acme");
        tenant.db_password = Some("ciphertext".to_string());

        let json = serde_json::to_value(&tenant).unwrap();
        assert!(json.get("db_password").is_none());
        assert_eq!(json["schema"], "t_acme");

        let back: Tenant = serde_json::from_value(json).unwrap();
        assert!(back.db_password.is_none());
    }
}
