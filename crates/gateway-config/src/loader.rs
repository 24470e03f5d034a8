//! Configuration loading.
//!
//! Sources, later wins: built-in defaults, the config file, inline routes
//! from `GATEWAY_ROUTES`, then the individual `GATEWAY_*` overrides.
//! `${VAR}` references in credentials, proxy tokens and account IDs are
//! expanded last.

use crate::config::{GatewayConfig, RouteConfig};
use crate::error::ConfigError;
use regex::{Captures, Regex};
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Config file path
pub const CONFIG_ENV: &str = "GATEWAY_CONFIG";
/// Inline routes as a JSON array
pub const ROUTES_ENV: &str = "GATEWAY_ROUTES";
/// Bind host override
pub const HOST_ENV: &str = "GATEWAY_HOST";
/// Bind port override
pub const PORT_ENV: &str = "GATEWAY_PORT";
/// Single proxy token override
pub const PROXY_TOKEN_ENV: &str = "GATEWAY_PROXY_TOKEN";
/// Log level override
pub const LOG_LEVEL_ENV: &str = "GATEWAY_LOG_LEVEL";

const ENV_REFERENCE: &str = r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}";

/// Environment variable lookup
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Config file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML (default)
    Yaml,
    /// TOML
    Toml,
    /// JSON
    Json,
}

impl ConfigFormat {
    /// Detect the format from a file extension; no extension means YAML
    ///
    /// # Errors
    /// Returns error for unknown extensions
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            None => Ok(Self::Yaml),
            Some(ext) => match ext.to_ascii_lowercase().as_str() {
                "yaml" | "yml" => Ok(Self::Yaml),
                "toml" => Ok(Self::Toml),
                "json" => Ok(Self::Json),
                other => Err(ConfigError::UnsupportedFormat(other.to_string())),
            },
        }
    }

    /// Parse a document in this format
    ///
    /// # Errors
    /// Returns error if the document does not parse
    pub fn parse(self, content: &str, source_name: &str) -> Result<GatewayConfig, ConfigError> {
        match self {
            Self::Yaml => {
                serde_yaml::from_str(content).map_err(|e| ConfigError::parse(source_name, e))
            }
            Self::Toml => toml::from_str(content).map_err(|e| ConfigError::parse(source_name, e)),
            Self::Json => {
                serde_json::from_str(content).map_err(|e| ConfigError::parse(source_name, e))
            }
        }
    }
}

/// Layered configuration loader
#[derive(Clone)]
pub struct ConfigLoader {
    path: Option<PathBuf>,
    env: EnvLookup,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self {
            path: None,
            env: Arc::new(|name: &str| std::env::var(name).ok()),
        }
    }
}

impl std::fmt::Debug for ConfigLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigLoader")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl ConfigLoader {
    /// Loader reading the process environment
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this file instead of `GATEWAY_CONFIG`
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Replace the environment lookup
    #[must_use]
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(lookup);
        self
    }

    /// Load, expand and validate the configuration
    ///
    /// # Errors
    /// Returns error if any source fails to load or the result is invalid
    pub fn load(&self) -> Result<GatewayConfig, ConfigError> {
        let config = self.load_unchecked()?;
        config.check()?;

        info!(
            routes = config.routes.len(),
            auth = config.auth.enabled(),
            rotation = ?config.rotation,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Load and expand the configuration without validating it
    ///
    /// For callers that layer further overrides on top and run
    /// [`GatewayConfig::check`] themselves.
    ///
    /// # Errors
    /// Returns error if any source fails to load or a reference cannot be expanded
    pub fn load_unchecked(&self) -> Result<GatewayConfig, ConfigError> {
        let path = self
            .path
            .clone()
            .or_else(|| self.var(CONFIG_ENV).map(PathBuf::from));

        let mut config = match &path {
            Some(path) => read_file(path)?,
            None => {
                debug!("No config file given, starting from defaults");
                GatewayConfig::default()
            }
        };

        self.apply_env(&mut config)?;
        self.expand(&mut config)?;
        debug!(file = ?path, routes = config.routes.len(), "Configuration read");
        Ok(config)
    }

    fn var(&self, name: &str) -> Option<String> {
        (self.env)(name).filter(|value| !value.is_empty())
    }

    fn apply_env(&self, config: &mut GatewayConfig) -> Result<(), ConfigError> {
        if let Some(routes) = self.var(ROUTES_ENV) {
            config.routes = serde_json::from_str::<Vec<RouteConfig>>(&routes)
                .map_err(|e| ConfigError::parse(ROUTES_ENV, e))?;
            debug!(routes = config.routes.len(), "Routes replaced from environment");
        }
        if let Some(host) = self.var(HOST_ENV) {
            config.server.host = host;
        }
        if let Some(port) = self.var(PORT_ENV) {
            config.server.port = port.parse().map_err(|e| ConfigError::InvalidEnv {
                var: PORT_ENV.to_string(),
                message: format!("'{port}' is not a valid port: {e}"),
            })?;
        }
        if let Some(token) = self.var(PROXY_TOKEN_ENV) {
            config.auth.proxy_tokens = vec![SecretString::new(token)];
        }
        if let Some(level) = self.var(LOG_LEVEL_ENV) {
            config.logging.level = level;
        }
        Ok(())
    }

    fn expand(&self, config: &mut GatewayConfig) -> Result<(), ConfigError> {
        let pattern = Regex::new(ENV_REFERENCE).map_err(|e| ConfigError::invalid(e.to_string()))?;
        let expand = |value: &str| self.expand_value(&pattern, value);

        for token in &mut config.auth.proxy_tokens {
            *token = SecretString::new(expand(token.expose_secret())?);
        }
        for provider in config.routes.iter_mut().flat_map(|r| r.providers.iter_mut()) {
            for key in &mut provider.api_keys {
                *key = SecretString::new(expand(key.expose_secret())?);
            }
            if let Some(account_id) = &provider.account_id {
                provider.account_id = Some(expand(account_id)?);
            }
        }
        Ok(())
    }

    fn expand_value(&self, pattern: &Regex, value: &str) -> Result<String, ConfigError> {
        let mut missing = None;
        let expanded = pattern.replace_all(value, |caps: &Captures<'_>| {
            let name = &caps[1];
            self.var(name).unwrap_or_else(|| {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            })
        });

        match missing {
            Some(name) => Err(ConfigError::MissingEnv(name)),
            None => Ok(expanded.into_owned()),
        }
    }
}

fn read_file(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let format = ConfigFormat::from_path(path)?;
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    format.parse(&content, &path.display().to_string())
}
