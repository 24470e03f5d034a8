//! Shared application state.

use crate::auth::ProxyAuth;
use gateway_routing::Router;
use std::sync::Arc;
use std::time::Instant;

/// State shared by every handler
#[derive(Debug, Clone)]
pub struct AppState {
    /// Route resolver and fallback executor
    pub router: Arc<Router>,
    /// Proxy-token check
    pub auth: Arc<ProxyAuth>,
    started: Instant,
}

impl AppState {
    /// Create state around a router
    #[must_use]
    pub fn new(router: Router, auth: ProxyAuth) -> Self {
        Self {
            router: Arc::new(router),
            auth: Arc::new(auth),
            started: Instant::now(),
        }
    }

    /// Seconds since the state was built
    #[must_use]
    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}
