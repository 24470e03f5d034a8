//! Server assembly and lifecycle.

use crate::{auth::ProxyAuth, routes::create_router, shutdown::shutdown_signal, state::AppState};
use gateway_config::{ConfigError, GatewayConfig, ServerConfig};
use gateway_core::GatewayError;
use gateway_providers::{build_http_client, ProviderRegistry};
use gateway_routing::{CredentialRotator, Router};
use secrecy::ExposeSecret;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::info;

/// Server startup and runtime errors
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration could not be turned into a running gateway
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Component construction failed
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Listener could not be bound
    #[error("Failed to bind {address}: {source}")]
    Bind {
        /// Requested address
        address: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Serving failed
    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// The gateway HTTP server
#[derive(Debug)]
pub struct Server {
    settings: ServerConfig,
    state: AppState,
}

impl Server {
    /// Build a server from explicit parts
    #[must_use]
    pub fn new(settings: ServerConfig, state: AppState) -> Self {
        Self { settings, state }
    }

    /// Wire registry, rotator and router from configuration
    ///
    /// # Errors
    /// Returns error if the route table or HTTP client cannot be built
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ServerError> {
        let upstream_timeout = config.server.upstream_timeout;
        let client = build_http_client(upstream_timeout)?;
        let registry = Arc::new(ProviderRegistry::with_defaults(client, upstream_timeout));
        let rotator = CredentialRotator::with_policy(registry, config.rotation.build());
        let policy = rotator.policy().name();
        let router = Router::new(Arc::new(config.route_table()?), rotator);
        let auth = ProxyAuth::new(
            config
                .auth
                .proxy_tokens
                .iter()
                .map(|token| token.expose_secret().as_str()),
        );

        info!(
            routes = router.routes().len(),
            auth = auth.is_enabled(),
            rotation = policy,
            "Gateway assembled"
        );

        Ok(Self::new(config.server.clone(), AppState::new(router, auth)))
    }

    /// Shared state
    #[must_use]
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// The axum router with all layers applied
    #[must_use]
    pub fn app(&self) -> axum::Router {
        create_router(self.state.clone(), self.settings.request_timeout)
    }

    /// Bind the configured address
    ///
    /// # Errors
    /// Returns error if the address cannot be bound
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let address = self.settings.bind_address();
        TcpListener::bind(&address)
            .await
            .map_err(|source| ServerError::Bind { address, source })
    }

    /// Serve until Ctrl-C or SIGTERM
    ///
    /// # Errors
    /// Returns error if binding or serving fails
    pub async fn run(self) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener, async {
            shutdown_signal().await;
        })
        .await
    }

    /// Serve on a bound listener until `shutdown` resolves
    ///
    /// # Errors
    /// Returns error if serving fails
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local: Option<SocketAddr> = listener.local_addr().ok();
        info!(address = ?local, "Gateway listening");

        axum::serve(listener, self.app())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(ServerError::Serve)?;

        info!("Gateway stopped");
        Ok(())
    }
}
