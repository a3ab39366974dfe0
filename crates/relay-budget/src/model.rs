//! Budget domain types.
//!
//! Definitions, usage records, cached status, alerts, and the constraint
//! decision lattice. All money is decimal; limits and recorded costs never
//! round through binary floats.

use crate::error::BudgetError;
use chrono::{DateTime, Duration as ChronoDuration, Months, Utc};
use relay_core::{BudgetHealth, BudgetId, CacheStatus, ModelId, ProviderId, RequestId, ScopeKind, ScopeTuple};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Currencies accepted for budget limits and usage records.
const KNOWN_CURRENCIES: &[&str] = &[
    "USD", "EUR", "GBP", "JPY", "CHF", "CAD", "AUD", "SEK", "NOK", "DKK", "BRL", "INR",
];

/// A budget's accounting period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetPeriod {
    /// One day
    Daily,
    /// Seven days
    Weekly,
    /// One calendar month
    Monthly,
    /// Three calendar months
    Quarterly,
    /// One calendar year
    Annual,
    /// Caller-supplied end date
    Custom,
}

impl BudgetPeriod {
    /// Compute the period end from its start: the period length added to the
    /// start, rounded to end-of-day UTC. `Custom` has no derivable end.
    #[must_use]
    pub fn end_from(self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let raw = match self {
            Self::Daily => start + ChronoDuration::days(1),
            Self::Weekly => start + ChronoDuration::days(7),
            Self::Monthly => start.checked_add_months(Months::new(1))?,
            Self::Quarterly => start.checked_add_months(Months::new(3))?,
            Self::Annual => start.checked_add_months(Months::new(12))?,
            Self::Custom => return None,
        };
        Some(end_of_day_utc(raw))
    }
}

/// Round a timestamp to the end of its UTC day.
#[must_use]
pub fn end_of_day_utc(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive()
        .and_hms_milli_opt(23, 59, 59, 999)
        .map_or(at, |eod| eod.and_utc())
}

/// The scope a budget applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeRef {
    /// Which dimension of the scope tuple
    pub scope_type: ScopeKind,
    /// Identifier within that dimension
    pub scope_id: String,
}

impl ScopeRef {
    /// Create a scope reference.
    #[must_use]
    pub fn new(scope_type: ScopeKind, scope_id: impl Into<String>) -> Self {
        Self {
            scope_type,
            scope_id: scope_id.into(),
        }
    }

    /// Whether a request's scope tuple falls under this scope.
    #[must_use]
    pub fn covers(&self, scope: &ScopeTuple) -> bool {
        scope.get(self.scope_type) == Some(self.scope_id.as_str())
    }
}

/// Actions a crossed threshold may schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThresholdAction {
    /// Notify the budget owner
    Notify,
    /// Restrict routing to cheaper models
    RestrictModels,
    /// Require an approval role for further spend
    RequireApproval,
    /// Block all further spend
    BlockAll,
    /// Downgrade requests to the economy tier
    AutoDowngrade,
}

/// Which threshold an alert belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdKind {
    /// The warning threshold
    Warning,
    /// The critical threshold
    Critical,
    /// 100% of the limit
    Exceeded,
}

/// A persisted budget definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetDefinition {
    /// Unique identifier
    pub id: BudgetId,
    /// Human-readable name
    pub name: String,
    /// Scope the budget bills against
    pub scope: ScopeRef,
    /// Spend limit for one period
    pub limit: Decimal,
    /// ISO-4217 currency
    pub currency: String,
    /// Accounting period
    pub period: BudgetPeriod,
    /// Period start
    pub start_date: DateTime<Utc>,
    /// Period end (computed from the period unless custom)
    pub end_date: DateTime<Utc>,
    /// Whether the budget rolls into a new period at the end
    pub recurring: bool,
    /// Warning threshold as a percent of the limit
    pub warning_threshold: Decimal,
    /// Critical threshold as a percent of the limit
    pub critical_threshold: Decimal,
    /// Actions scheduled when the warning threshold is crossed
    #[serde(default)]
    pub warning_actions: Vec<ThresholdAction>,
    /// Actions scheduled when the critical threshold is crossed
    #[serde(default)]
    pub critical_actions: Vec<ThresholdAction>,
    /// Actions scheduled when the limit is exceeded
    #[serde(default)]
    pub exceeded_actions: Vec<ThresholdAction>,
    /// Whether override roles may bypass approval requirements
    pub allow_overrides: bool,
    /// Roles allowed to override (persisted JSON-encoded)
    #[serde(default)]
    pub override_roles: Vec<String>,
    /// Parent budget in the hierarchy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<BudgetId>,
    /// Soft-disable flag; disabled budgets are skipped by constraint checks
    pub enabled: bool,
    /// Who created the budget
    pub created_by: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl BudgetDefinition {
    /// The actions configured for one threshold kind.
    #[must_use]
    pub fn actions_for(&self, kind: ThresholdKind) -> &[ThresholdAction] {
        match kind {
            ThresholdKind::Warning => &self.warning_actions,
            ThresholdKind::Critical => &self.critical_actions,
            ThresholdKind::Exceeded => &self.exceeded_actions,
        }
    }

    /// The threshold percent for one threshold kind.
    #[must_use]
    pub fn threshold_percent(&self, kind: ThresholdKind) -> Decimal {
        match kind {
            ThresholdKind::Warning => self.warning_threshold,
            ThresholdKind::Critical => self.critical_threshold,
            ThresholdKind::Exceeded => Decimal::ONE_HUNDRED,
        }
    }

    /// Whether any of the caller's roles may override approval requirements.
    #[must_use]
    pub fn allows_override_for(&self, roles: &[String]) -> bool {
        self.allow_overrides
            && roles
                .iter()
                .any(|role| self.override_roles.iter().any(|r| r == role))
    }
}

/// Input for creating or updating a budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetDraft {
    /// Human-readable name
    pub name: String,
    /// Scope the budget bills against
    pub scope: ScopeRef,
    /// Spend limit for one period
    pub limit: Decimal,
    /// ISO-4217 currency
    pub currency: String,
    /// Accounting period
    pub period: BudgetPeriod,
    /// Period start; defaults to now
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    /// Explicit period end; required for custom periods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    /// Whether the budget recurs
    #[serde(default)]
    pub recurring: bool,
    /// Warning threshold percent
    pub warning_threshold: Decimal,
    /// Critical threshold percent
    pub critical_threshold: Decimal,
    /// Warning actions
    #[serde(default)]
    pub warning_actions: Vec<ThresholdAction>,
    /// Critical actions
    #[serde(default)]
    pub critical_actions: Vec<ThresholdAction>,
    /// Exceeded actions
    #[serde(default)]
    pub exceeded_actions: Vec<ThresholdAction>,
    /// Whether override roles may bypass approvals
    #[serde(default)]
    pub allow_overrides: bool,
    /// Override roles
    #[serde(default)]
    pub override_roles: Vec<String>,
    /// Parent budget
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<BudgetId>,
}

impl BudgetDraft {
    /// Validate the draft and resolve its period window.
    ///
    /// # Errors
    /// Returns `ThresholdsInvalid`, `CurrencyUnknown`, or `InvalidPeriod`.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>), BudgetError> {
        if self.warning_threshold < Decimal::ZERO
            || self.warning_threshold > self.critical_threshold
            || self.critical_threshold > Decimal::ONE_HUNDRED
        {
            return Err(BudgetError::ThresholdsInvalid(format!(
                "expected 0 <= warning <= critical <= 100, got warning={} critical={}",
                self.warning_threshold, self.critical_threshold
            )));
        }

        if !KNOWN_CURRENCIES.contains(&self.currency.as_str()) {
            return Err(BudgetError::CurrencyUnknown(self.currency.clone()));
        }

        let start = self.start_date.unwrap_or(now);
        let end = match self.end_date {
            Some(end) => end,
            None => self.period.end_from(start).ok_or_else(|| {
                BudgetError::InvalidPeriod("custom periods require an explicit end date".to_string())
            })?,
        };

        if end <= start {
            return Err(BudgetError::InvalidPeriod(format!(
                "end date {end} is not after start date {start}"
            )));
        }

        Ok((start, end))
    }
}

/// An immutable usage ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Unique identifier
    pub usage_id: String,
    /// Budget the usage bills against
    pub budget_id: BudgetId,
    /// The request that incurred the cost
    pub request_id: RequestId,
    /// Scope tuple of the request
    pub scope: ScopeTuple,
    /// Provider that served the request
    pub provider: ProviderId,
    /// Model that served the request
    pub model: ModelId,
    /// Input tokens consumed
    pub input_tokens: u32,
    /// Output tokens produced
    pub output_tokens: u32,
    /// Cost at the cost model's prices
    pub cost: Decimal,
    /// ISO-4217 currency
    pub currency: String,
    /// When the usage occurred
    pub timestamp: DateTime<Utc>,
    /// The model originally requested, when downgraded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_model: Option<ModelId>,
    /// Whether the request was downgraded
    pub downgraded: bool,
    /// Budget status at recording time
    pub status_snapshot: BudgetHealth,
    /// Cache outcome for the request
    pub cache_status: CacheStatus,
}

impl UsageRecord {
    /// Create a usage record stamped now.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        budget_id: BudgetId,
        request_id: RequestId,
        scope: ScopeTuple,
        provider: ProviderId,
        model: ModelId,
        input_tokens: u32,
        output_tokens: u32,
        cost: Decimal,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            usage_id: format!("use_{}", uuid::Uuid::new_v4().simple()),
            budget_id,
            request_id,
            scope,
            provider,
            model,
            input_tokens,
            output_tokens,
            cost,
            currency: currency.into(),
            timestamp: Utc::now(),
            original_model: None,
            downgraded: false,
            status_snapshot: BudgetHealth::Normal,
            cache_status: CacheStatus::Miss,
        }
    }

    /// Mark the record as a downgrade from another model.
    #[must_use]
    pub fn downgraded_from(mut self, original: ModelId) -> Self {
        self.original_model = Some(original);
        self.downgraded = true;
        self
    }

    /// Set the cache outcome.
    #[must_use]
    pub fn with_cache_status(mut self, cache_status: CacheStatus) -> Self {
        self.cache_status = cache_status;
        self
    }
}

/// The cached consumption snapshot for one budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetStatusSnapshot {
    /// The budget this snapshot describes
    pub budget_id: BudgetId,
    /// Spend accrued in the current period
    pub current_amount: Decimal,
    /// Limit minus current amount, floored at zero
    pub remaining: Decimal,
    /// Percent of the limit consumed
    pub percent_used: Decimal,
    /// Average spend per elapsed day
    pub burn_rate_per_day: Decimal,
    /// Current amount plus burn rate over the remaining days
    pub projected_total: Decimal,
    /// Status derived from the thresholds
    pub status: BudgetHealth,
    /// Unresolved alert kinds
    pub active_alerts: Vec<ThresholdKind>,
    /// When this snapshot was computed
    pub last_updated: DateTime<Utc>,
}

/// A threshold alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetAlert {
    /// Unique identifier
    pub alert_id: String,
    /// The budget that crossed a threshold
    pub budget_id: BudgetId,
    /// Which threshold was crossed
    pub kind: ThresholdKind,
    /// Percent used at trigger time
    pub percent_used: Decimal,
    /// Actions scheduled by this alert
    pub actions: Vec<ThresholdAction>,
    /// Human-readable description
    pub message: String,
    /// When the alert fired
    pub triggered_at: DateTime<Utc>,
    /// Whether the alert has been resolved
    pub resolved: bool,
}

impl BudgetAlert {
    /// Create an unresolved alert stamped now.
    #[must_use]
    pub fn new(
        budget_id: BudgetId,
        kind: ThresholdKind,
        percent_used: Decimal,
        actions: Vec<ThresholdAction>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            alert_id: format!("alr_{}", uuid::Uuid::new_v4().simple()),
            budget_id,
            kind,
            percent_used,
            actions,
            message: message.into(),
            triggered_at: Utc::now(),
            resolved: false,
        }
    }
}

/// Constraint check decisions, least to most restrictive.
///
/// Aggregation across scopes takes the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConstraintDecision {
    /// Admit the request unchanged
    Allow,
    /// Admit at the economy tier
    AllowWithDowngrade,
    /// Admit only with an override role
    RequireApproval,
    /// Reject the request
    Deny,
}

/// The outcome of checking one budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintOutcome {
    /// The budget checked
    pub budget_id: BudgetId,
    /// The decision for this budget
    pub decision: ConstraintDecision,
    /// Human-readable reason
    pub reason: String,
    /// Actions the caller should consider
    pub suggested_actions: Vec<ThresholdAction>,
}

/// Aggregated constraint check across every applicable budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintReport {
    /// The most restrictive decision
    pub decision: ConstraintDecision,
    /// Reason for the most restrictive decision
    pub reason: String,
    /// Per-budget outcomes
    pub outcomes: Vec<ConstraintOutcome>,
}

impl ConstraintReport {
    /// An allow-everything report for requests with no applicable budgets.
    #[must_use]
    pub fn unconstrained() -> Self {
        Self {
            decision: ConstraintDecision::Allow,
            reason: "no applicable budgets".to_string(),
            outcomes: Vec::new(),
        }
    }

    /// Aggregate per-budget outcomes by taking the most restrictive.
    #[must_use]
    pub fn aggregate(outcomes: Vec<ConstraintOutcome>) -> Self {
        let worst = outcomes
            .iter()
            .max_by_key(|outcome| outcome.decision)
            .map(|outcome| (outcome.decision, outcome.reason.clone()));

        match worst {
            Some((decision, reason)) => Self {
                decision,
                reason,
                outcomes,
            },
            None => Self::unconstrained(),
        }
    }
}

/// Aggregated usage over a window, for the admin summary contract.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageSummary {
    /// Requests counted
    pub request_count: u64,
    /// Total input tokens
    pub total_input_tokens: u64,
    /// Total output tokens
    pub total_output_tokens: u64,
    /// Total cost
    pub total_cost: Decimal,
    /// Cost by model
    pub by_model: HashMap<String, Decimal>,
    /// Cost by provider
    pub by_provider: HashMap<String, Decimal>,
}

impl UsageSummary {
    /// Fold a usage record into the summary.
    pub fn add(&mut self, record: &UsageRecord) {
        self.request_count += 1;
        self.total_input_tokens += u64::from(record.input_tokens);
        self.total_output_tokens += u64::from(record.output_tokens);
        self.total_cost += record.cost;
        *self
            .by_model
            .entry(record.model.as_str().to_string())
            .or_insert(Decimal::ZERO) += record.cost;
        *self
            .by_provider
            .entry(record.provider.as_str().to_string())
            .or_insert(Decimal::ZERO) += record.cost;
    }
}
