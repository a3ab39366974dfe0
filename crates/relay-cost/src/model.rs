//! The cost model.
//!
//! Maps `(provider, model, input tokens, output tokens)` to a cost in the
//! profile's currency. All arithmetic is decimal; binary floating point
//! never touches a persisted amount.

use crate::estimator::TokenEstimate;
use relay_core::{ModelId, ProviderId, RelayError};
use relay_providers::{ProviderProfile, ProviderRegistry};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Cost model over the provider registry's profiles.
#[derive(Clone)]
pub struct CostModel {
    registry: Arc<ProviderRegistry>,
}

impl CostModel {
    /// Create a cost model reading prices from the registry.
    #[must_use]
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    /// Cost of a call against an enabled profile.
    ///
    /// # Errors
    /// Returns `UnknownModel` when no enabled profile matches the
    /// `(provider, model)` pair.
    pub fn cost(
        &self,
        provider: &ProviderId,
        model: &ModelId,
        input_tokens: u32,
        output_tokens: u32,
    ) -> Result<Decimal, RelayError> {
        let profile = self.registry.enabled_profile(model)?;
        if profile.provider != *provider {
            return Err(RelayError::UnknownModel {
                model: model.clone(),
            });
        }
        Ok(profile.cost(input_tokens, output_tokens))
    }

    /// Predicted cost of an estimate against a specific profile.
    #[must_use]
    pub fn estimated_cost(profile: &ProviderProfile, estimate: &TokenEstimate) -> Decimal {
        profile.cost(estimate.input_tokens, estimate.estimated_output_tokens)
    }

    /// The registry this model reads from.
    #[must_use]
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }
}
