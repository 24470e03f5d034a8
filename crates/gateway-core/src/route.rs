//! Route table and provider configuration.
//!
//! Both are built once at startup and shared read-only for the lifetime of
//! the process.

use crate::error::GatewayError;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Upstream provider family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderFamily {
    /// Cloudflare Workers AI
    #[serde(rename = "workers-ai", alias = "cloudflare")]
    WorkersAi,
    /// OpenAI and OpenAI-compatible APIs
    #[serde(rename = "openai")]
    OpenAi,
    /// Anthropic Messages API
    #[serde(rename = "anthropic")]
    Anthropic,
    /// Google Gemini
    #[serde(rename = "google", alias = "gemini")]
    Google,
}

impl ProviderFamily {
    /// Configuration tag of the family
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkersAi => "workers-ai",
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
        }
    }
}

impl std::fmt::Display for ProviderFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authentication secret for one provider
#[derive(Clone)]
pub struct Credential {
    secret: SecretString,
}

impl Credential {
    /// Wrap a secret value
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: SecretString::new(secret.into()),
        }
    }

    /// Expose the secret for an upstream call
    #[must_use]
    pub fn expose(&self) -> &str {
        self.secret.expose_secret()
    }
}

impl From<SecretString> for Credential {
    fn from(secret: SecretString) -> Self {
        Self { secret }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for Credential {}

/// One provider+model entry of a route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Provider family
    pub family: ProviderFamily,
    /// Upstream model identifier
    pub model: String,
    /// Base URL override for the upstream API
    pub base_url: Option<String>,
    /// Cloudflare account ID (Workers AI)
    pub account_id: Option<String>,
    credentials: Vec<Credential>,
}

impl ProviderConfig {
    /// Create a provider configuration
    ///
    /// # Errors
    /// Returns error if no credentials are given
    pub fn new(
        family: ProviderFamily,
        model: impl Into<String>,
        credentials: Vec<Credential>,
    ) -> Result<Self, GatewayError> {
        let model = model.into();
        if credentials.is_empty() {
            return Err(GatewayError::configuration(format!(
                "provider {family}/{model} must have at least one credential"
            )));
        }

        Ok(Self {
            family,
            model,
            base_url: None,
            account_id: None,
            credentials,
        })
    }

    /// Set the base URL override
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the Cloudflare account ID
    #[must_use]
    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    /// Credentials in configured order (never empty)
    #[must_use]
    pub fn credentials(&self) -> &[Credential] {
        &self.credentials
    }

    /// `family/model` label for logs
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}/{}", self.family, self.model)
    }
}

/// A route path with its ordered provider list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Normalized route path
    pub path: String,
    /// Providers in fallback order
    pub providers: Vec<ProviderConfig>,
}

/// Route path to provider list mapping, in configuration order
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
    index: HashMap<String, usize>,
}

impl RouteTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route
    ///
    /// # Errors
    /// Returns error if the path is empty or duplicated, or no providers are given
    pub fn insert(
        &mut self,
        path: &str,
        providers: Vec<ProviderConfig>,
    ) -> Result<(), GatewayError> {
        if path.trim().is_empty() {
            return Err(GatewayError::configuration("route path must not be empty"));
        }
        let path = normalize_path(path);
        if self.index.contains_key(&path) {
            return Err(GatewayError::configuration(format!(
                "duplicate route '{path}'"
            )));
        }
        if providers.is_empty() {
            return Err(GatewayError::configuration(format!(
                "route '{path}' must have at least one provider"
            )));
        }

        self.index.insert(path.clone(), self.routes.len());
        self.routes.push(Route { path, providers });
        Ok(())
    }

    /// Builder-style insert
    ///
    /// # Errors
    /// See [`RouteTable::insert`]
    pub fn with_route(
        mut self,
        path: &str,
        providers: Vec<ProviderConfig>,
    ) -> Result<Self, GatewayError> {
        self.insert(path, providers)?;
        Ok(self)
    }

    /// Exact lookup on a normalized path
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Route> {
        self.index.get(path).map(|&i| &self.routes[i])
    }

    /// First-inserted route
    #[must_use]
    pub fn first(&self) -> Option<&Route> {
        self.routes.first()
    }

    /// Routes in configuration order
    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    /// Number of routes
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the table has no routes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Ensure a path starts with `/`
#[must_use]
pub fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}
