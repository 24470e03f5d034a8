//! Route resolution and provider fallback.

use crate::rotator::{panic_message, CredentialRotator};
use futures::FutureExt;
use gateway_core::route::normalize_path;
use gateway_core::{ChatRequest, GatewayError, ProviderConfig, ProviderResult, RouteTable};
use gateway_telemetry::{provider_span, route_span};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

/// Resolves routes and walks their providers in order
#[derive(Debug, Clone)]
pub struct Router {
    routes: Arc<RouteTable>,
    rotator: CredentialRotator,
}

impl Router {
    /// Create a new router
    #[must_use]
    pub fn new(routes: Arc<RouteTable>, rotator: CredentialRotator) -> Self {
        Self { routes, rotator }
    }

    /// Route table in use
    #[must_use]
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Resolve the ordered provider list for a path.
    ///
    /// Exact match first, then the first route (in configuration order)
    /// whose path is a string prefix of the request path, then the
    /// first-configured route as a default.
    ///
    /// # Errors
    /// Returns [`GatewayError::RouteNotFound`] if the table is empty
    pub fn resolve_providers(&self, path: &str) -> Result<&[ProviderConfig], GatewayError> {
        let path = normalize_path(path);

        if let Some(route) = self.routes.get(&path) {
            return Ok(&route.providers);
        }

        if let Some(route) = self.routes.iter().find(|r| path.starts_with(&r.path)) {
            debug!(path = %path, route = %route.path, "Resolved route by prefix");
            return Ok(&route.providers);
        }

        if let Some(route) = self.routes.first() {
            warn!(path = %path, route = %route.path, "No route matched, using default route");
            return Ok(&route.providers);
        }

        Err(GatewayError::route_not_found(path))
    }

    /// Execute a request against the route's providers until one succeeds
    ///
    /// # Errors
    /// Returns [`GatewayError::RouteNotFound`] if the path does not resolve,
    /// or [`GatewayError::AllProvidersFailed`] once every provider failed
    pub async fn execute_with_fallback(&self, path: &str, request: &ChatRequest) -> ProviderResult {
        let span = route_span!(normalize_path(path));
        self.fallback(path, request).instrument(span).await
    }

    async fn fallback(&self, path: &str, request: &ChatRequest) -> ProviderResult {
        let providers = self.resolve_providers(path)?;
        let mut attempts = 0_usize;
        let mut last_error: Option<GatewayError> = None;

        for config in providers {
            attempts += 1;

            let call = self
                .rotator
                .execute_with_rotation(config, request)
                .instrument(provider_span!(config, attempts));
            let result = match AssertUnwindSafe(call).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(GatewayError::internal(format!(
                    "provider call panicked: {}",
                    panic_message(panic.as_ref())
                ))),
            };

            match result {
                Ok(outcome) => {
                    info!(
                        provider = %config.family,
                        model = %config.model,
                        attempt = attempts,
                        stream = outcome.is_stream(),
                        "Provider succeeded"
                    );
                    return Ok(outcome);
                }
                Err(err) => {
                    warn!(
                        provider = %config.family,
                        model = %config.model,
                        attempt = attempts,
                        error = %err,
                        "Provider failed, trying next"
                    );
                    last_error = Some(err);
                }
            }
        }

        Err(GatewayError::AllProvidersFailed {
            attempts,
            last_error: last_error
                .map_or_else(|| "no provider attempted".to_string(), |e| e.to_string()),
        })
    }
}
