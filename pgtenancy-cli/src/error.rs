//! Error types for the pgtenancy CLI.

use pgtenancy::TenancyError;
use pgtenancy_config::ConfigError;
use std::fmt;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// CLI error types.
#[derive(Debug)]
pub enum CliError {
    /// IO error (prompts, spawning the migration runner)
    Io(std::io::Error),

    /// Configuration could not be loaded or is invalid
    Config(String),

    /// Tenancy operation failed
    Tenancy(TenancyError),

    /// External command failed
    Command(String),

    /// Invalid argument
    InvalidArgument(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Io(e) => write!(f, "IO error: {}", e),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Tenancy(e) => write!(f, "{}", e),
            CliError::Command(msg) => write!(f, "Command error: {}", msg),
            CliError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<TenancyError> for CliError {
    fn from(e: TenancyError) -> Self {
        CliError::Tenancy(e)
    }
}

impl From<dialoguer::Error> for CliError {
    fn from(e: dialoguer::Error) -> Self {
        CliError::Io(e.into())
    }
}
