//! Credential rotation policies.
//!
//! A policy decides the order in which a provider's credentials are tried
//! for one call. Every policy yields each credential index exactly once.

use dashmap::DashMap;
use gateway_core::ProviderConfig;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Credential ordering strategy
pub trait RotationPolicy: Send + Sync + std::fmt::Debug {
    /// Policy name for logs
    fn name(&self) -> &'static str;

    /// Credential indices to try for one call, each exactly once
    fn order(&self, config: &ProviderConfig) -> Vec<usize>;
}

/// Always start at the first credential
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialPolicy;

impl RotationPolicy for SequentialPolicy {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn order(&self, config: &ProviderConfig) -> Vec<usize> {
        (0..config.credentials().len()).collect()
    }
}

/// Advance the starting credential on every call.
///
/// Offsets are kept per provider+model, so one credential does not absorb
/// all the traffic while the others idle.
#[derive(Debug, Default)]
pub struct RoundRobinPolicy {
    offsets: DashMap<String, AtomicUsize>,
}

impl RoundRobinPolicy {
    /// Create a policy with all offsets at zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RotationPolicy for RoundRobinPolicy {
    fn name(&self) -> &'static str {
        "round-robin"
    }

    fn order(&self, config: &ProviderConfig) -> Vec<usize> {
        let count = config.credentials().len();
        if count == 0 {
            return Vec::new();
        }

        let start = self
            .offsets
            .entry(config.label())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed)
            % count;

        (0..count).map(|i| (start + i) % count).collect()
    }
}

/// Configured rotation policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RotationStrategy {
    /// [`SequentialPolicy`]
    #[default]
    Sequential,
    /// [`RoundRobinPolicy`]
    RoundRobin,
}

impl RotationStrategy {
    /// Build the policy for this strategy
    #[must_use]
    pub fn build(self) -> Arc<dyn RotationPolicy> {
        match self {
            Self::Sequential => Arc::new(SequentialPolicy),
            Self::RoundRobin => Arc::new(RoundRobinPolicy::new()),
        }
    }
}
