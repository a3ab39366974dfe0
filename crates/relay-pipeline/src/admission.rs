//! Admission control.
//!
//! A global concurrency cap plus per-provider caps derived from profile
//! `max_concurrency`. Acquisition is non-blocking: excess requests fail
//! fast with `Overloaded` instead of queueing into wasted work.

use dashmap::DashMap;
use relay_core::{ProviderId, RelayError};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::warn;

/// Concurrency caps for the pipeline.
pub struct AdmissionControl {
    global: Arc<Semaphore>,
    per_provider: DashMap<ProviderId, Arc<Semaphore>>,
}

impl AdmissionControl {
    /// Create admission control with a global cap.
    #[must_use]
    pub fn new(max_concurrency: u32) -> Self {
        Self {
            global: Arc::new(Semaphore::new(max_concurrency as usize)),
            per_provider: DashMap::new(),
        }
    }

    /// Take the global admission permit.
    ///
    /// # Errors
    /// Returns `Overloaded` when the global cap is reached.
    pub fn admit(&self) -> Result<OwnedSemaphorePermit, RelayError> {
        Arc::clone(&self.global).try_acquire_owned().map_err(|_| {
            warn!("Global concurrency cap reached");
            RelayError::Overloaded {
                scope: "global".to_string(),
            }
        })
    }

    /// Take a dispatch permit for one provider.
    ///
    /// The semaphore for a provider is sized on first use from the profile's
    /// `max_concurrency`.
    ///
    /// # Errors
    /// Returns `Overloaded` when the provider's cap is reached.
    pub fn provider_permit(
        &self,
        provider: &ProviderId,
        max_concurrency: u32,
    ) -> Result<OwnedSemaphorePermit, RelayError> {
        let semaphore = self
            .per_provider
            .entry(provider.clone())
            .or_insert_with(|| Arc::new(Semaphore::new(max_concurrency as usize)))
            .clone();

        semaphore.try_acquire_owned().map_err(|_| {
            warn!(provider = %provider, "Provider concurrency cap reached");
            RelayError::Overloaded {
                scope: provider.as_str().to_string(),
            }
        })
    }

    /// Permits currently available globally.
    #[must_use]
    pub fn available(&self) -> usize {
        self.global.available_permits()
    }
}
