//! Error types for the gateway.
//!
//! Every failure the gateway can produce is a [`GatewayError`]. Provider-level
//! failures are recovered by the credential rotator and the router; only the
//! aggregate variants, routing failures and request validation failures ever
//! reach the inbound caller.

use thiserror::Error;

/// Result type used across the gateway crates
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Gateway error taxonomy
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Malformed or missing configuration (fatal at startup)
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// Invalid inbound request
    #[error("Validation error: {message}")]
    Validation {
        /// Error message
        message: String,
        /// Offending field, if known
        field: Option<String>,
        /// Machine-readable error code
        code: String,
    },

    /// Missing or invalid proxy token
    #[error("Authentication error: {message}")]
    Authentication {
        /// Error message
        message: String,
    },

    /// No route matches the request path and no default route exists
    #[error("No route configured for path '{path}'")]
    RouteNotFound {
        /// Normalized request path
        path: String,
    },

    /// A single provider/credential attempt failed
    #[error("Provider '{provider}' error: {message}")]
    Provider {
        /// Provider family tag
        provider: String,
        /// Error message
        message: String,
        /// Upstream HTTP status, if one was received
        status_code: Option<u16>,
        /// Whether another credential or provider may succeed; reported in
        /// logs only, rotation and fallback try every candidate regardless
        retryable: bool,
    },

    /// Upstream stream failed after it was opened
    #[error("Streaming error: {message}")]
    Streaming {
        /// Error message
        message: String,
    },

    /// Every credential of a provider configuration failed
    #[error("All {attempts} credential(s) failed for {provider}/{model}: {last_error}")]
    CredentialsExhausted {
        /// Provider family tag
        provider: String,
        /// Model identifier
        model: String,
        /// Number of credentials attempted
        attempts: usize,
        /// Message of the last observed failure
        last_error: String,
    },

    /// Every provider configured for a route failed
    #[error("All {attempts} provider(s) failed. Last error: {last_error}")]
    AllProvidersFailed {
        /// Number of providers attempted
        attempts: usize,
        /// Message of the last observed failure
        last_error: String,
    },

    /// Unexpected internal fault
    #[error("Internal error: {message}")]
    Internal {
        /// Error message
        message: String,
    },
}

impl GatewayError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(
        message: impl Into<String>,
        field: Option<String>,
        code: impl Into<String>,
    ) -> Self {
        Self::Validation {
            message: message.into(),
            field,
            code: code.into(),
        }
    }

    /// Create an authentication error
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Create a route-not-found error
    pub fn route_not_found(path: impl Into<String>) -> Self {
        Self::RouteNotFound { path: path.into() }
    }

    /// Create a provider error
    pub fn provider(
        provider: impl Into<String>,
        message: impl Into<String>,
        status_code: Option<u16>,
        retryable: bool,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            status_code,
            retryable,
        }
    }

    /// Create a streaming error
    pub fn streaming(message: impl Into<String>) -> Self {
        Self::Streaming {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// HTTP status classification for this error
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::Authentication { .. } => 401,
            Self::RouteNotFound { .. } => 404,
            Self::Provider { status_code, .. } => match status_code {
                Some(code) if (400..600).contains(code) => *code,
                _ => 502,
            },
            Self::Streaming { .. } => 502,
            Self::Configuration { .. }
            | Self::CredentialsExhausted { .. }
            | Self::AllProvidersFailed { .. }
            | Self::Internal { .. } => 500,
        }
    }

    /// OpenAI-style error type string
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "invalid_request_error",
            Self::Authentication { .. } => "authentication_error",
            Self::RouteNotFound { .. } => "not_found_error",
            Self::Provider { .. } | Self::Streaming { .. } => "upstream_error",
            Self::Configuration { .. }
            | Self::CredentialsExhausted { .. }
            | Self::AllProvidersFailed { .. }
            | Self::Internal { .. } => "server_error",
        }
    }

    /// Machine-readable error code
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::Validation { code, .. } => code,
            Self::Authentication { .. } => "invalid_proxy_token",
            Self::RouteNotFound { .. } => "route_not_found",
            Self::Provider { .. } => "provider_error",
            Self::Streaming { .. } => "stream_error",
            Self::Configuration { .. } => "configuration_error",
            Self::CredentialsExhausted { .. } => "credentials_exhausted",
            Self::AllProvidersFailed { .. } => "all_providers_failed",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Whether a different credential or provider might succeed
    ///
    /// Diagnostic only. Attempt order never depends on it.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { retryable, .. } => *retryable,
            Self::Streaming { .. } | Self::Internal { .. } => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("JSON serialization failed: {err}"))
    }
}
