//! Configuration types for the gateway.

use crate::error::ConfigError;
use gateway_core::route::normalize_path;
use gateway_core::{Credential, ProviderConfig, ProviderFamily, RouteTable};
use gateway_routing::RotationStrategy;
use gateway_telemetry::LoggingConfig;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use validator::Validate;

/// Root gateway configuration
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP server settings
    #[validate(nested)]
    pub server: ServerConfig,

    /// Inbound proxy-token authentication
    pub auth: AuthConfig,

    /// Logging settings
    pub logging: LoggingConfig,

    /// Credential rotation strategy
    pub rotation: RotationStrategy,

    /// Routes in resolution order
    #[validate(length(min = 1, message = "at least one route must be configured"), nested)]
    pub routes: Vec<RouteConfig>,
}

impl GatewayConfig {
    /// Run derive validation plus cross-field checks
    ///
    /// # Errors
    /// Returns the first problem found
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;

        let mut seen = HashSet::new();
        for route in &self.routes {
            if route.path.trim().is_empty() {
                return Err(ConfigError::invalid("route path must not be empty"));
            }
            let path = normalize_path(route.path.trim());
            if !seen.insert(path.clone()) {
                return Err(ConfigError::invalid(format!("duplicate route '{path}'")));
            }
            for provider in &route.providers {
                provider.check(&path)?;
            }
        }

        if self
            .auth
            .proxy_tokens
            .iter()
            .any(|token| token.expose_secret().is_empty())
        {
            return Err(ConfigError::invalid("proxy tokens must not be empty"));
        }

        Ok(())
    }

    /// Build the immutable route table
    ///
    /// # Errors
    /// Returns error if a route cannot be built
    pub fn route_table(&self) -> Result<RouteTable, ConfigError> {
        let mut table = RouteTable::new();
        for route in &self.routes {
            let providers = route
                .providers
                .iter()
                .map(ProviderEntry::to_provider_config)
                .collect::<Result<Vec<_>, _>>()?;
            table
                .insert(route.path.trim(), providers)
                .map_err(|e| ConfigError::invalid(e.to_string()))?;
        }
        Ok(table)
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    /// Bind host
    #[serde(default = "default_host")]
    #[validate(length(min = 1))]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    #[validate(range(min = 1))]
    pub port: u16,

    /// Whole-request timeout
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Total deadline for a non-streaming upstream call; for streams it
    /// bounds the wait between reads
    #[serde(default = "default_upstream_timeout", with = "humantime_serde")]
    pub upstream_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
            upstream_timeout: default_upstream_timeout(),
        }
    }
}

impl ServerConfig {
    /// `host:port` bind address
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_upstream_timeout() -> Duration {
    Duration::from_secs(60)
}

/// Proxy-token authentication; disabled when no token is configured
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Accepted bearer tokens
    pub proxy_tokens: Vec<SecretString>,
}

impl AuthConfig {
    /// Whether inbound requests must present a token
    #[must_use]
    pub fn enabled(&self) -> bool {
        !self.proxy_tokens.is_empty()
    }
}

/// One route and its providers in fallback order
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RouteConfig {
    /// Route path
    #[validate(length(min = 1))]
    pub path: String,

    /// Providers in fallback order
    #[validate(length(min = 1, message = "route must have at least one provider"), nested)]
    pub providers: Vec<ProviderEntry>,
}

/// One provider within a route
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProviderEntry {
    /// Provider family
    #[serde(alias = "family")]
    pub provider: ProviderFamily,

    /// Upstream model identifier
    #[validate(length(min = 1))]
    pub model: String,

    /// Credentials tried in order
    #[serde(default, alias = "credentials", skip_serializing)]
    pub api_keys: Vec<SecretString>,

    /// Cloudflare account ID (required for Workers AI)
    #[serde(default)]
    pub account_id: Option<String>,

    /// Upstream base URL override
    #[serde(default)]
    #[validate(url)]
    pub base_url: Option<String>,
}

impl ProviderEntry {
    fn check(&self, path: &str) -> Result<(), ConfigError> {
        let label = format!("{path}: {}/{}", self.provider, self.model);

        if self.api_keys.is_empty() {
            return Err(ConfigError::invalid(format!(
                "{label} must have at least one credential"
            )));
        }
        if let Some(index) = self
            .api_keys
            .iter()
            .position(|key| key.expose_secret().trim().is_empty())
        {
            return Err(ConfigError::invalid(format!(
                "{label} has an empty credential at index {index}"
            )));
        }
        if self.provider == ProviderFamily::WorkersAi
            && self.account_id.as_deref().map_or(true, |id| id.trim().is_empty())
        {
            return Err(ConfigError::invalid(format!(
                "{label} requires account_id"
            )));
        }

        Ok(())
    }

    fn to_provider_config(&self) -> Result<ProviderConfig, ConfigError> {
        let credentials = self
            .api_keys
            .iter()
            .cloned()
            .map(Credential::from)
            .collect();

        let mut config = ProviderConfig::new(self.provider, self.model.clone(), credentials)
            .map_err(|e| ConfigError::invalid(e.to_string()))?;
        if let Some(base_url) = &self.base_url {
            config = config.with_base_url(base_url.trim_end_matches('/'));
        }
        if let Some(account_id) = &self.account_id {
            config = config.with_account_id(account_id.clone());
        }
        Ok(config)
    }
}
