//! Configuration errors.

use gateway_core::GatewayError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File extension is not a known format
    #[error("Unsupported config format '{0}' (expected yaml, yml, toml or json)")]
    UnsupportedFormat(String),

    /// Document did not parse
    #[error("Failed to parse {source_name}: {message}")]
    Parse {
        /// File path or environment variable the document came from
        source_name: String,
        /// Parser message
        message: String,
    },

    /// `${VAR}` reference to an unset variable
    #[error("Environment variable '{0}' referenced in config is not set")]
    MissingEnv(String),

    /// Environment override has an unusable value
    #[error("Invalid value for {var}: {message}")]
    InvalidEnv {
        /// Variable name
        var: String,
        /// What was wrong
        message: String,
    },

    /// Configuration parsed but is not usable
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub(crate) fn parse(source_name: impl Into<String>, message: impl ToString) -> Self {
        Self::Parse {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

impl From<validator::ValidationErrors> for ConfigError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Invalid(errors.to_string())
    }
}

impl From<ConfigError> for GatewayError {
    fn from(err: ConfigError) -> Self {
        Self::configuration(err.to_string())
    }
}
