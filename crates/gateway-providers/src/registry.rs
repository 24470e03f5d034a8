//! Provider registry.
//!
//! Maps each provider family to its adapter. Built once at startup and
//! shared read-only.

use crate::anthropic::AnthropicAdapter;
use crate::google::GoogleAdapter;
use crate::openai::OpenAiAdapter;
use crate::workers_ai::{RestBinding, WorkersAiAdapter, WorkersAiBinding};
use gateway_core::{ProviderAdapter, ProviderFamily};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Adapter lookup by provider family
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    adapters: HashMap<ProviderFamily, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in adapter sharing one HTTP client
    ///
    /// `deadline` bounds each non-streaming upstream call end to end.
    #[must_use]
    pub fn with_defaults(client: Client, deadline: Duration) -> Self {
        let rest = RestBinding::new(client.clone()).with_timeout(deadline);
        let mut registry = Self::new();
        registry.register(Arc::new(WorkersAiAdapter::new(Arc::new(rest))));
        registry.register(Arc::new(OpenAiAdapter::new(client.clone()).with_timeout(deadline)));
        registry.register(Arc::new(AnthropicAdapter::new(client.clone()).with_timeout(deadline)));
        registry.register(Arc::new(GoogleAdapter::new(client).with_timeout(deadline)));
        registry
    }

    /// Replace the Workers AI binding
    #[must_use]
    pub fn with_workers_ai_binding(mut self, binding: Arc<dyn WorkersAiBinding>) -> Self {
        self.register(Arc::new(WorkersAiAdapter::new(binding)));
        self
    }

    /// Register an adapter, replacing any adapter for the same family
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        let family = adapter.family();
        if self.adapters.insert(family, adapter).is_some() {
            info!(provider = %family, "Replaced provider adapter");
        }
    }

    /// Adapter for a family
    #[must_use]
    pub fn get(&self, family: ProviderFamily) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&family).cloned()
    }

    /// Registered families
    pub fn families(&self) -> impl Iterator<Item = ProviderFamily> + '_ {
        self.adapters.keys().copied()
    }

    /// Number of registered adapters
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Whether no adapter is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut families: Vec<_> = self.adapters.keys().map(ProviderFamily::as_str).collect();
        families.sort_unstable();
        f.debug_struct("ProviderRegistry")
            .field("families", &families)
            .finish()
    }
}
