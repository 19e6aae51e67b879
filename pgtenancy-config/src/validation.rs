// Configuration validation

use crate::{ConfigError, Result};

/// Trait for validating configuration
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Configuration validator with rules
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate that a value is not empty
    pub fn not_empty(value: &str, field: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::invalid(field, "cannot be empty"));
        }
        Ok(())
    }

    /// Validate that an optional value is present and not empty
    pub fn required(value: Option<&str>, field: &str) -> Result<()> {
        match value {
            Some(value) => Self::not_empty(value, field),
            None => Err(ConfigError::invalid(field, "is required")),
        }
    }

    /// Validate that a number is at least `min`
    pub fn at_least<T: PartialOrd + std::fmt::Display>(value: T, min: T, field: &str) -> Result<()> {
        if value < min {
            return Err(ConfigError::invalid(
                field,
                format!("must be at least {}, got {}", min, value),
            ));
        }
        Ok(())
    }

    /// Validate port number
    pub fn is_port(value: u16, field: &str) -> Result<()> {
        if value == 0 {
            return Err(ConfigError::invalid(field, "must be a valid port number"));
        }
        Ok(())
    }

    /// Validate a bare host name (no scheme, path or port)
    pub fn is_hostname(value: &str, field: &str) -> Result<()> {
        Self::not_empty(value, field)?;

        let valid = value
            .split('.')
            .all(|label| {
                !label.is_empty()
                    && label.len() <= 63
                    && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            });

        if !valid {
            return Err(ConfigError::invalid(field, format!("'{}' is not a host name", value)));
        }
        Ok(())
    }
}
