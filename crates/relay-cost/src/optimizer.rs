//! Cost-based model selection.
//!
//! Chooses one candidate profile under a strategy. Candidates arrive already
//! filtered by capability and health; an empty set is `NoEligibleModel`.

use crate::estimator::TokenEstimate;
use crate::model::CostModel;
use relay_core::RelayError;
use relay_providers::ProviderProfile;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizeStrategy {
    /// Minimize cost; break ties by lower advertised latency.
    Aggressive,
    /// Minimize `cost × (1 + advertised_latency / latency_reference)`.
    Balanced {
        /// Latency that counts as a 2× cost penalty
        latency_reference: Duration,
    },
    /// From the top quality tier present, minimize cost.
    QualityFirst,
}

impl Default for OptimizeStrategy {
    fn default() -> Self {
        Self::Balanced {
            latency_reference: Duration::from_millis(2000),
        }
    }
}

/// Choose the optimal candidate under a strategy.
///
/// # Errors
/// Returns `NoEligibleModel` when the candidate set is empty.
pub fn choose_candidate(
    candidates: &[Arc<ProviderProfile>],
    estimate: &TokenEstimate,
    strategy: OptimizeStrategy,
) -> Result<Arc<ProviderProfile>, RelayError> {
    if candidates.is_empty() {
        return Err(RelayError::NoEligibleModel {
            reason: "candidate set is empty after capability and health filtering".to_string(),
        });
    }

    let chosen = match strategy {
        OptimizeStrategy::Aggressive => pick_cheapest(candidates, estimate),
        OptimizeStrategy::Balanced { latency_reference } => {
            pick_balanced(candidates, estimate, latency_reference)
        }
        OptimizeStrategy::QualityFirst => {
            let top_tier = candidates
                .iter()
                .map(|p| p.quality_tier)
                .max()
                .unwrap_or_default();
            let tier: Vec<Arc<ProviderProfile>> = candidates
                .iter()
                .filter(|p| p.quality_tier == top_tier)
                .cloned()
                .collect();
            pick_cheapest(&tier, estimate)
        }
    };

    debug!(
        model = %chosen.model,
        provider = %chosen.provider,
        strategy = ?strategy,
        "Optimizer selected candidate"
    );

    Ok(chosen)
}

fn pick_cheapest(
    candidates: &[Arc<ProviderProfile>],
    estimate: &TokenEstimate,
) -> Arc<ProviderProfile> {
    let mut best = Arc::clone(&candidates[0]);
    let mut best_cost = CostModel::estimated_cost(&best, estimate);

    for candidate in &candidates[1..] {
        let cost = CostModel::estimated_cost(candidate, estimate);
        let cheaper = cost < best_cost
            || (cost == best_cost && candidate.advertised_latency < best.advertised_latency);
        if cheaper {
            best = Arc::clone(candidate);
            best_cost = cost;
        }
    }

    best
}

fn pick_balanced(
    candidates: &[Arc<ProviderProfile>],
    estimate: &TokenEstimate,
    latency_reference: Duration,
) -> Arc<ProviderProfile> {
    let reference_ms = Decimal::from(latency_reference.as_millis().max(1) as u64);

    let score = |profile: &ProviderProfile| -> Decimal {
        let cost = CostModel::estimated_cost(profile, estimate);
        let latency_ms = Decimal::from(profile.advertised_latency.as_millis() as u64);
        cost * (Decimal::ONE + latency_ms / reference_ms)
    };

    let mut best = Arc::clone(&candidates[0]);
    let mut best_score = score(&best);

    for candidate in &candidates[1..] {
        let candidate_score = score(candidate);
        if candidate_score < best_score {
            best = Arc::clone(candidate);
            best_score = candidate_score;
        }
    }

    best
}
