// Typed tenancy settings

use crate::connection::ConnectionConfig;
use crate::validation::{ConfigValidator, Validate};
use crate::{ConfigError, ConfigManager, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// How inbound requests are mapped to tenants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenancyMode {
    Subdomain,
    Path,
    #[default]
    Team,
}

impl TenancyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenancyMode::Subdomain => "subdomain",
            TenancyMode::Path => "path",
            TenancyMode::Team => "team",
        }
    }
}

impl FromStr for TenancyMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "subdomain" => Ok(TenancyMode::Subdomain),
            "path" => Ok(TenancyMode::Path),
            "team" => Ok(TenancyMode::Team),
            other => Err(ConfigError::invalid(
                "mode",
                format!("unknown tenancy mode '{}', expected subdomain, path or team", other),
            )),
        }
    }
}

impl fmt::Display for TenancyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wiring of the team model, read by collaborators that own team membership
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamSettings {
    pub pivot_table: String,
    pub current_team_relationship: String,
}

impl Default for TeamSettings {
    fn default() -> Self {
        Self {
            pivot_table: "team_user".to_string(),
            current_team_relationship: "current_team".to_string(),
        }
    }
}

fn default_connection_name() -> String {
    "pgsql".to_string()
}

fn default_segment_index() -> usize {
    1
}

/// Tenancy settings.
///
/// Built from a [`ConfigManager`] so that files, `.env` and `PGTENANCY_*`
/// environment variables all feed the same keys.
///
/// # Examples
///
/// ```
/// use pgtenancy_config::{ConfigManager, TenancyConfig, TenancyMode};
///
/// let manager = ConfigManager::new();
/// manager.set("mode", "path").unwrap();
/// manager.set("path_segment_index", "2").unwrap();
///
/// let config = TenancyConfig::from_manager(&manager).unwrap();
/// assert_eq!(config.mode, TenancyMode::Path);
/// assert_eq!(config.path_segment_index, 2);
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct TenancyConfig {
    #[serde(default)]
    pub mode: TenancyMode,
    #[serde(default = "default_connection_name")]
    pub base_connection: String,
    #[serde(default = "default_connection_name")]
    pub system_connection: String,
    #[serde(default = "default_connection_name")]
    pub default_connection: String,
    #[serde(default, deserialize_with = "crate::serde_helpers::lenient_bool")]
    pub forbid_unresolved: bool,
    #[serde(default)]
    pub base_domain: Option<String>,
    #[serde(
        default = "default_segment_index",
        deserialize_with = "crate::serde_helpers::lenient_usize"
    )]
    pub path_segment_index: usize,
    #[serde(default)]
    pub team: TeamSettings,
    /// Base64 encoded 32 byte key for stored credentials
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionConfig>,
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            mode: TenancyMode::default(),
            base_connection: default_connection_name(),
            system_connection: default_connection_name(),
            default_connection: default_connection_name(),
            forbid_unresolved: false,
            base_domain: None,
            path_segment_index: default_segment_index(),
            team: TeamSettings::default(),
            key: None,
            connections: BTreeMap::new(),
        }
    }
}

impl TenancyConfig {
    /// Deserialize from the manager's current values, without validating.
    ///
    /// A `database_url` key (`PGTENANCY_DATABASE_URL`) replaces the
    /// connection named by `default_connection`.
    pub fn from_manager(manager: &ConfigManager) -> Result<Self> {
        let mut snapshot = manager.snapshot();

        let database_url = snapshot.remove("database_url");
        // Env values can only ever be strings; a stray `PGTENANCY_CONNECTIONS`
        // must not shadow the file's table.
        if matches!(snapshot.get("connections"), Some(serde_json::Value::String(_))) {
            snapshot.remove("connections");
        }
        if matches!(snapshot.get("team"), Some(serde_json::Value::String(_))) {
            snapshot.remove("team");
        }

        let mut config: TenancyConfig = serde_json::from_value(serde_json::Value::Object(snapshot))
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))?;

        if let Some(serde_json::Value::String(url)) = database_url {
            config.apply_database_url(&url)?;
        }

        Ok(config)
    }

    /// Deserialize and validate
    pub fn load(manager: &ConfigManager) -> Result<Self> {
        let config = Self::from_manager(manager)?;
        config.validate()?;
        Ok(config)
    }

    /// Install `url` as the default connection
    pub fn apply_database_url(&mut self, url: &str) -> Result<()> {
        let connection = ConnectionConfig::from_url(url)?;
        self.connections.insert(self.default_connection.clone(), connection);
        Ok(())
    }

    /// Look up a named connection template
    pub fn connection(&self, name: &str) -> Result<&ConnectionConfig> {
        self.connections
            .get(name)
            .ok_or_else(|| ConfigError::KeyNotFound(format!("connections.{}", name)))
    }

    /// Template cloned for every tenant connection
    pub fn base_template(&self) -> Result<&ConnectionConfig> {
        self.connection(&self.base_connection)
    }

    /// Privileged connection used for provisioning
    pub fn system_template(&self) -> Result<&ConnectionConfig> {
        self.connection(&self.system_connection)
    }

    /// Shared connection that holds the tenant registry
    pub fn default_template(&self) -> Result<&ConnectionConfig> {
        self.connection(&self.default_connection)
    }

    /// JSON view with passwords and the key masked
    pub fn redacted(&self) -> serde_json::Value {
        let mut copy = self.clone();
        if copy.key.is_some() {
            copy.key = Some("***".to_string());
        }
        for connection in copy.connections.values_mut() {
            *connection = connection.redacted();
        }
        serde_json::to_value(copy).unwrap_or(serde_json::Value::Null)
    }
}

impl Validate for TenancyConfig {
    fn validate(&self) -> Result<()> {
        ConfigValidator::at_least(self.path_segment_index, 1, "path_segment_index")?;

        if self.mode == TenancyMode::Subdomain {
            ConfigValidator::required(self.base_domain.as_deref(), "base_domain")?;
        }
        if let Some(ref domain) = self.base_domain {
            ConfigValidator::is_hostname(domain, "base_domain")?;
        }

        for (name, connection) in &self.connections {
            connection.validate().map_err(|e| match e {
                ConfigError::ValidationError { key, message } => {
                    ConfigError::invalid(format!("connections.{}.{}", name, key), message)
                }
                other => other,
            })?;
        }

        ConfigValidator::not_empty(&self.base_connection, "base_connection")?;
        ConfigValidator::not_empty(&self.system_connection, "system_connection")?;
        ConfigValidator::not_empty(&self.default_connection, "default_connection")
    }
}

impl fmt::Debug for TenancyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenancyConfig")
            .field("mode", &self.mode)
            .field("base_connection", &self.base_connection)
            .field("system_connection", &self.system_connection)
            .field("default_connection", &self.default_connection)
            .field("forbid_unresolved", &self.forbid_unresolved)
            .field("base_domain", &self.base_domain)
            .field("path_segment_index", &self.path_segment_index)
            .field("team", &self.team)
            .field("key", &self.key.as_ref().map(|_| "***"))
            .field("connections", &self.connections)
            .finish()
    }
}
