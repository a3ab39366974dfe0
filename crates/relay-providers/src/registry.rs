//! The provider registry.
//!
//! Maps model ids to profiles and provider ids to adapters. Profiles are
//! shared immutably and replaced wholesale with an atomic swap so in-flight
//! requests keep the snapshot they started with. Health bookkeeping is fed
//! by adapter call outcomes.

use crate::profile::ProviderProfile;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use relay_core::{Capability, ModelId, ProviderAdapter, ProviderId, RelayError};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Consecutive failures after which a model is considered unhealthy.
const UNHEALTHY_AFTER: u32 = 3;

/// Health bookkeeping for one model.
#[derive(Debug, Clone)]
pub struct HealthRecord {
    /// Whether the model is currently considered healthy
    pub healthy: bool,
    /// Consecutive failures observed
    pub consecutive_failures: u32,
    /// Last error observed, if any
    pub last_error: Option<String>,
    /// When the record was last updated
    pub last_updated: DateTime<Utc>,
}

impl Default for HealthRecord {
    fn default() -> Self {
        Self {
            healthy: true,
            consecutive_failures: 0,
            last_error: None,
            last_updated: Utc::now(),
        }
    }
}

/// Registry of provider profiles and adapters.
pub struct ProviderRegistry {
    profiles: ArcSwap<HashMap<ModelId, Arc<ProviderProfile>>>,
    adapters: DashMap<ProviderId, Arc<dyn ProviderAdapter>>,
    health: DashMap<ModelId, HealthRecord>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            profiles: ArcSwap::new(Arc::new(HashMap::new())),
            adapters: DashMap::new(),
            health: DashMap::new(),
        }
    }

    /// Register an adapter for a provider.
    pub fn register_adapter(&self, adapter: Arc<dyn ProviderAdapter>) {
        let id = adapter.id().clone();
        debug!(provider = %id, "Registering provider adapter");
        self.adapters.insert(id, adapter);
    }

    /// Resolve the adapter for a provider.
    #[must_use]
    pub fn adapter(&self, provider: &ProviderId) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(provider).map(|entry| Arc::clone(&entry))
    }

    /// Replace all profiles atomically.
    ///
    /// Validation fully succeeds before the swap; a failed load leaves the
    /// previous profiles serving.
    ///
    /// # Errors
    /// Returns `Configuration` when a profile is invalid or an enabled
    /// profile has no registered adapter.
    pub fn load_profiles(&self, profiles: Vec<ProviderProfile>) -> Result<(), RelayError> {
        let mut map = HashMap::with_capacity(profiles.len());
        for profile in profiles {
            profile.validate()?;
            if profile.enabled && !self.adapters.contains_key(&profile.provider) {
                return Err(RelayError::configuration(format!(
                    "enabled profile '{}' references provider '{}' with no registered adapter",
                    profile.model, profile.provider
                )));
            }
            if map
                .insert(profile.model.clone(), Arc::new(profile))
                .is_some()
            {
                return Err(RelayError::configuration(
                    "duplicate model id in profile set",
                ));
            }
        }

        info!(models = map.len(), "Provider profiles loaded");
        self.profiles.store(Arc::new(map));
        Ok(())
    }

    /// Snapshot of the current profile map.
    #[must_use]
    pub fn profiles(&self) -> Arc<HashMap<ModelId, Arc<ProviderProfile>>> {
        self.profiles.load_full()
    }

    /// Look up the profile for a model.
    #[must_use]
    pub fn profile(&self, model: &ModelId) -> Option<Arc<ProviderProfile>> {
        self.profiles.load().get(model).cloned()
    }

    /// Look up an enabled profile, failing with `UnknownModel` otherwise.
    ///
    /// # Errors
    /// Returns `UnknownModel` when no enabled profile matches.
    pub fn enabled_profile(&self, model: &ModelId) -> Result<Arc<ProviderProfile>, RelayError> {
        self.profile(model)
            .filter(|p| p.enabled)
            .ok_or_else(|| RelayError::UnknownModel {
                model: model.clone(),
            })
    }

    /// All enabled profiles, optionally filtered by capability.
    #[must_use]
    pub fn enabled_profiles(&self, capability: Option<Capability>) -> Vec<Arc<ProviderProfile>> {
        self.profiles
            .load()
            .values()
            .filter(|p| p.enabled)
            .filter(|p| capability.map_or(true, |c| p.supports(c)))
            .cloned()
            .collect()
    }

    /// Whether a model is currently considered healthy.
    ///
    /// Models with no recorded outcome are healthy by default.
    #[must_use]
    pub fn is_healthy(&self, model: &ModelId) -> bool {
        self.health
            .get(model)
            .map_or(true, |record| record.healthy)
    }

    /// Current health record for a model, if any outcome was recorded.
    #[must_use]
    pub fn health(&self, model: &ModelId) -> Option<HealthRecord> {
        self.health.get(model).map(|record| record.clone())
    }

    /// Record a successful call against a model.
    pub fn record_success(&self, model: &ModelId) {
        let mut record = self.health.entry(model.clone()).or_default();
        record.healthy = true;
        record.consecutive_failures = 0;
        record.last_error = None;
        record.last_updated = Utc::now();
    }

    /// Record a failed call against a model.
    ///
    /// The model turns unhealthy after a run of consecutive failures.
    pub fn record_failure(&self, model: &ModelId, error: impl Into<String>) {
        let mut record = self.health.entry(model.clone()).or_default();
        record.consecutive_failures += 1;
        record.last_error = Some(error.into());
        record.last_updated = Utc::now();
        if record.consecutive_failures >= UNHEALTHY_AFTER && record.healthy {
            warn!(
                model = %model,
                failures = record.consecutive_failures,
                "Model marked unhealthy"
            );
            record.healthy = false;
        }
    }

    /// Force a model's health state (used by health check sweeps and tests).
    pub fn set_health(&self, model: &ModelId, healthy: bool) {
        let mut record = self.health.entry(model.clone()).or_default();
        record.healthy = healthy;
        if healthy {
            record.consecutive_failures = 0;
            record.last_error = None;
        }
        record.last_updated = Utc::now();
    }

    /// Number of registered adapters.
    #[must_use]
    pub fn adapter_count(&self) -> usize {
        self.adapters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use relay_core::{
        AdapterHealth, Deadline, FinishReason, ModelOutput, ProviderCall, TokenUsage,
    };
    use rust_decimal_macros::dec;

    struct StubAdapter {
        id: ProviderId,
    }

    #[async_trait]
    impl ProviderAdapter for StubAdapter {
        fn id(&self) -> &ProviderId {
            &self.id
        }

        async fn call(
            &self,
            request: &ProviderCall,
            _deadline: Deadline,
        ) -> Result<ModelOutput, RelayError> {
            Ok(ModelOutput {
                content: "ok".to_string(),
                usage: TokenUsage::new(1, 1),
                finish_reason: FinishReason::Stop,
                model_used: request.model.as_str().to_string(),
            })
        }

        async fn health(&self) -> AdapterHealth {
            AdapterHealth::healthy()
        }

        fn supports(&self, _capability: Capability) -> bool {
            true
        }
    }

    fn registry_with_openai() -> ProviderRegistry {
        let registry = ProviderRegistry::new();
        registry.register_adapter(Arc::new(StubAdapter {
            id: ProviderId::new("openai"),
        }));
        registry
    }

    #[test]
    fn test_load_profiles_and_lookup() {
        let registry = registry_with_openai();
        registry
            .load_profiles(vec![ProviderProfile::new("openai", "gpt-4-turbo")
                .with_pricing(dec!(0.00001), dec!(0.00003))])
            .expect("load");

        let profile = registry
            .enabled_profile(&ModelId::new("gpt-4-turbo"))
            .expect("profile");
        assert_eq!(profile.provider.as_str(), "openai");

        let missing = registry.enabled_profile(&ModelId::new("nope"));
        assert!(matches!(missing, Err(RelayError::UnknownModel { .. })));
    }

    #[test]
    fn test_load_rejects_orphan_enabled_profile() {
        let registry = ProviderRegistry::new();
        let result = registry.load_profiles(vec![ProviderProfile::new("openai", "gpt-4-turbo")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_failed_load_keeps_previous_profiles() {
        let registry = registry_with_openai();
        registry
            .load_profiles(vec![ProviderProfile::new("openai", "gpt-4-turbo")])
            .expect("first load");

        // Second load references an unregistered provider and must fail
        let result =
            registry.load_profiles(vec![ProviderProfile::new("unregistered", "other-model")]);
        assert!(result.is_err());

        // Previous set still serves
        assert!(registry.profile(&ModelId::new("gpt-4-turbo")).is_some());
    }

    #[test]
    fn test_disabled_profile_not_enabled() {
        let registry = registry_with_openai();
        registry
            .load_profiles(vec![
                ProviderProfile::new("openai", "gpt-4-turbo").disabled()
            ])
            .expect("load");

        assert!(registry
            .enabled_profile(&ModelId::new("gpt-4-turbo"))
            .is_err());
        assert!(registry.enabled_profiles(None).is_empty());
    }

    #[test]
    fn test_health_transitions() {
        let registry = registry_with_openai();
        let model = ModelId::new("gpt-4-turbo");

        assert!(registry.is_healthy(&model));

        registry.record_failure(&model, "503");
        registry.record_failure(&model, "503");
        assert!(registry.is_healthy(&model));

        registry.record_failure(&model, "503");
        assert!(!registry.is_healthy(&model));

        registry.record_success(&model);
        assert!(registry.is_healthy(&model));
        let record = registry.health(&model).expect("record");
        assert_eq!(record.consecutive_failures, 0);
    }

    #[test]
    fn test_capability_filter() {
        let registry = registry_with_openai();
        registry
            .load_profiles(vec![
                ProviderProfile::new("openai", "gpt-4-turbo")
                    .with_capabilities(vec![Capability::TextGeneration, Capability::Vision]),
                ProviderProfile::new("openai", "gpt-3.5-turbo")
                    .with_capabilities(vec![Capability::TextGeneration]),
            ])
            .expect("load");

        let vision = registry.enabled_profiles(Some(Capability::Vision));
        assert_eq!(vision.len(), 1);
        assert_eq!(vision[0].model.as_str(), "gpt-4-turbo");
    }
}
