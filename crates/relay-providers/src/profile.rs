//! Provider profiles.
//!
//! A profile describes one model offered by one provider: capabilities,
//! per-token pricing, advertised latency, concurrency limits, and the
//! ordered fallback chain tried when the model fails.

use relay_core::{Capability, ModelId, ProviderId, QualityTier, RelayError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One model offered by one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderProfile {
    /// Provider offering the model
    pub provider: ProviderId,

    /// Model identifier, unique across the registry
    pub model: ModelId,

    /// Capabilities the model advertises (never empty)
    pub capabilities: Vec<Capability>,

    /// Cost per input token
    pub input_cost_per_token: Decimal,

    /// Cost per output token
    pub output_cost_per_token: Decimal,

    /// ISO-4217 currency for both cost fields
    pub currency: String,

    /// Advertised p50 latency
    #[serde(with = "humantime_serde")]
    pub advertised_latency: Duration,

    /// Maximum concurrent in-flight calls
    pub max_concurrency: u32,

    /// Whether the profile participates in routing
    pub enabled: bool,

    /// Quality tier this model belongs to
    #[serde(default)]
    pub quality_tier: QualityTier,

    /// Ordered successor models tried when this one fails
    #[serde(default)]
    pub fallback_models: Vec<ModelId>,
}

impl ProviderProfile {
    /// Create an enabled profile with standard-tier defaults.
    #[must_use]
    pub fn new(provider: impl Into<ProviderId>, model: impl Into<ModelId>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            capabilities: vec![Capability::TextGeneration],
            input_cost_per_token: Decimal::ZERO,
            output_cost_per_token: Decimal::ZERO,
            currency: "USD".to_string(),
            advertised_latency: Duration::from_millis(1000),
            max_concurrency: 100,
            enabled: true,
            quality_tier: QualityTier::Standard,
            fallback_models: Vec::new(),
        }
    }

    /// Set the per-token pricing.
    #[must_use]
    pub fn with_pricing(mut self, input: Decimal, output: Decimal) -> Self {
        self.input_cost_per_token = input;
        self.output_cost_per_token = output;
        self
    }

    /// Set the capability set.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Vec<Capability>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Set the advertised p50 latency.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.advertised_latency = latency;
        self
    }

    /// Set the quality tier.
    #[must_use]
    pub fn with_quality_tier(mut self, tier: QualityTier) -> Self {
        self.quality_tier = tier;
        self
    }

    /// Set the fallback chain.
    #[must_use]
    pub fn with_fallbacks(mut self, fallbacks: Vec<ModelId>) -> Self {
        self.fallback_models = fallbacks;
        self
    }

    /// Set the max concurrency.
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: u32) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Disable the profile.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Whether the model advertises a capability.
    #[must_use]
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Cost of a call at this profile's prices.
    #[must_use]
    pub fn cost(&self, input_tokens: u32, output_tokens: u32) -> Decimal {
        Decimal::from(input_tokens) * self.input_cost_per_token
            + Decimal::from(output_tokens) * self.output_cost_per_token
    }

    /// Validate profile invariants.
    ///
    /// # Errors
    /// Returns `Configuration` when costs are negative or the capability set
    /// is empty.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.input_cost_per_token < Decimal::ZERO || self.output_cost_per_token < Decimal::ZERO
        {
            return Err(RelayError::configuration(format!(
                "profile '{}' has negative per-token cost",
                self.model
            )));
        }
        if self.capabilities.is_empty() {
            return Err(RelayError::configuration(format!(
                "profile '{}' has an empty capability set",
                self.model
            )));
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(RelayError::configuration(format!(
                "profile '{}' has a malformed currency '{}'",
                self.model, self.currency
            )));
        }
        Ok(())
    }
}
