//! Error types

use crate::schema::ProvisionStep;
use pgtenancy_config::ConfigError;

/// Errors raised by tenancy operations.
///
/// Unresolved tenants are not errors; resolvers return `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum TenancyError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Configuration error for '{key}': {message}")]
    Configuration { key: String, message: String },

    /// Carries the statement category only, never the SQL text.
    #[error("Provisioning failed at '{step}': {message}")]
    Provisioning { step: ProvisionStep, message: String },

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Tenant not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl TenancyError {
    pub fn configuration(key: impl Into<String>, message: impl Into<String>) -> Self {
        TenancyError::Configuration {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Whether this error means the tenant does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, TenancyError::NotFound(_))
    }
}

impl From<ConfigError> for TenancyError {
    fn from(err: ConfigError) -> Self {
        let key = err.key().unwrap_or("config").to_string();
        let message = match err {
            ConfigError::KeyNotFound(_) => "is not configured".to_string(),
            ConfigError::ValidationError { message, .. } => message,
            other => other.to_string(),
        };
        TenancyError::Configuration { key, message }
    }
}

pub type Result<T> = std::result::Result<T, TenancyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_keeps_key() {
        let err: TenancyError = ConfigError::KeyNotFound("connections.pgsql".to_string()).into();
        match err {
            TenancyError::Configuration { key, message } => {
                assert_eq!(key, "connections.pgsql");
                assert_eq!(message, "is not configured");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_provisioning_display_names_step() {
        let err = TenancyError::Provisioning {
            step: ProvisionStep::CreateSchema,
            message: "permission denied".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Provisioning failed at 'create schema': permission denied"
        );
    }
}
