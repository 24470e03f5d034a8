//! Credential rotation.
//!
//! Tries one provider configuration's credentials in policy order until an
//! attempt succeeds. Adapter errors and panics are contained here; only the
//! aggregate [`GatewayError::CredentialsExhausted`] leaves the rotator.
//! Every failure moves on to the next credential; whether the error looked
//! retryable is logged but does not stop the rotation.

use crate::policy::{RotationPolicy, SequentialPolicy};
use futures::FutureExt;
use gateway_core::{ChatRequest, GatewayError, ProviderConfig, ProviderResult};
use gateway_providers::ProviderRegistry;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Executes a request against one provider, rotating through credentials
#[derive(Debug, Clone)]
pub struct CredentialRotator {
    registry: Arc<ProviderRegistry>,
    policy: Arc<dyn RotationPolicy>,
}

impl CredentialRotator {
    /// Create a rotator with the sequential policy
    #[must_use]
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self::with_policy(registry, Arc::new(SequentialPolicy))
    }

    /// Create a rotator with a custom policy
    #[must_use]
    pub fn with_policy(registry: Arc<ProviderRegistry>, policy: Arc<dyn RotationPolicy>) -> Self {
        Self { registry, policy }
    }

    /// Active rotation policy
    #[must_use]
    pub fn policy(&self) -> &dyn RotationPolicy {
        self.policy.as_ref()
    }

    /// Try each credential once, in policy order, until one succeeds
    pub async fn execute_with_rotation(
        &self,
        config: &ProviderConfig,
        request: &ChatRequest,
    ) -> ProviderResult {
        let Some(adapter) = self.registry.get(config.family) else {
            warn!(provider = %config.family, model = %config.model, "No adapter registered for provider");
            return Err(GatewayError::provider(
                config.family.as_str(),
                format!("no adapter registered for provider '{}'", config.family),
                None,
                false,
            ));
        };

        let credentials = config.credentials();
        let mut attempts = 0_usize;
        let mut last_error: Option<GatewayError> = None;

        for index in self.policy.order(config) {
            let Some(credential) = credentials.get(index) else {
                continue;
            };
            attempts += 1;

            debug!(
                provider = %config.family,
                model = %config.model,
                credential_index = index,
                attempt = attempts,
                policy = self.policy.name(),
                "Trying credential"
            );

            let outcome = AssertUnwindSafe(adapter.chat(config, credential, request))
                .catch_unwind()
                .await;

            let err = match outcome {
                Ok(Ok(result)) => {
                    if attempts > 1 {
                        info!(
                            provider = %config.family,
                            model = %config.model,
                            credential_index = index,
                            attempt = attempts,
                            "Credential succeeded after rotation"
                        );
                    }
                    return Ok(result);
                }
                Ok(Err(err)) => err,
                Err(panic) => GatewayError::internal(format!(
                    "adapter panicked: {}",
                    panic_message(panic.as_ref())
                )),
            };

            warn!(
                provider = %config.family,
                model = %config.model,
                credential_index = index,
                attempt = attempts,
                status = err.status_code(),
                retryable = err.is_retryable(),
                error = %err,
                "Credential attempt failed"
            );
            last_error = Some(err);
        }

        Err(GatewayError::CredentialsExhausted {
            provider: config.family.to_string(),
            model: config.model.clone(),
            attempts,
            last_error: last_error
                .map_or_else(|| "no credential attempted".to_string(), |e| e.to_string()),
        })
    }
}

/// Extract a panic payload's message
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
