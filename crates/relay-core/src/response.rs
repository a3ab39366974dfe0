//! Response contracts for the gateway.

use crate::types::{BudgetHealth, BudgetId, ModelId, ProviderId, RequestId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of generation
    Stop,
    /// Hit the max tokens limit
    Length,
    /// The model invoked a tool
    ToolUse,
    /// The upstream filtered the content
    ContentFilter,
    /// Anything else the upstream reported
    Other,
}

/// Token usage reported by (or estimated for) a completed call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the input
    pub input_tokens: u32,
    /// Tokens produced in the output
    pub output_tokens: u32,
}

impl TokenUsage {
    /// Create a usage pair.
    #[must_use]
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Total tokens.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// The normalized output of one provider call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelOutput {
    /// Generated content
    pub content: String,
    /// Token usage (reported by the upstream, or estimated)
    pub usage: TokenUsage,
    /// Why generation stopped
    pub finish_reason: FinishReason,
    /// The model the upstream actually used
    pub model_used: String,
}

/// Cache outcome for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// Served from cache
    Hit,
    /// Looked up, not found
    Miss,
    /// Cache skipped (streaming or explicit bypass)
    Bypass,
    /// Cache errored; degraded to miss
    Error,
}

impl CacheStatus {
    /// Stable string form used in headers and usage records.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Bypass => "bypass",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How this request affected the budgets it was billed against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetImpact {
    /// Worst status among the affected budgets
    pub status: BudgetHealth,
    /// Budgets the request was billed against
    pub affected_budgets: Vec<BudgetId>,
}

/// The gateway response with routing diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayResponse {
    /// The request this answers
    pub request_id: RequestId,

    /// Model that produced the response
    pub selected_model: ModelId,

    /// Provider that produced the response
    pub selected_provider: ProviderId,

    /// Candidates that were considered but not chosen
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<ModelId>,

    /// Why this model was chosen
    pub reasoning: String,

    /// Cost predicted before dispatch
    pub estimated_cost: Decimal,

    /// Cost computed from actual token counts
    pub actual_cost: Decimal,

    /// Currency for both cost fields
    pub currency: String,

    /// Budget consequences of this request
    pub budget_impact: BudgetImpact,

    /// Models actually attempted, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback_chain: Vec<ModelId>,

    /// Cache outcome
    pub cache_status: CacheStatus,

    /// The normalized model output
    pub output: ModelOutput,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage::new(100, 50);
        assert_eq!(usage.total(), 150);
    }

    #[test]
    fn test_cache_status_strings() {
        assert_eq!(CacheStatus::Hit.as_str(), "hit");
        assert_eq!(CacheStatus::Bypass.as_str(), "bypass");
    }

    #[test]
    fn test_response_serializes() {
        let response = RelayResponse {
            request_id: RequestId::new("req_1"),
            selected_model: ModelId::new("gpt-3.5-turbo"),
            selected_provider: ProviderId::new("openai"),
            alternatives: vec![ModelId::new("gpt-4-turbo")],
            reasoning: "cheapest candidate".to_string(),
            estimated_cost: dec!(0.000450),
            actual_cost: dec!(0.000312),
            currency: "USD".to_string(),
            budget_impact: BudgetImpact::default(),
            fallback_chain: vec![],
            cache_status: CacheStatus::Miss,
            output: ModelOutput {
                content: "hello".to_string(),
                usage: TokenUsage::new(10, 5),
                finish_reason: FinishReason::Stop,
                model_used: "gpt-3.5-turbo-0125".to_string(),
            },
        };

        let json = serde_json::to_string(&response).expect("serialize");
        assert!(json.contains("\"cache_status\":\"miss\""));
        assert!(json.contains("gpt-3.5-turbo"));
    }
}
