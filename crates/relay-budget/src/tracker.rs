//! Usage tracking, status computation, and constraint checks.
//!
//! Writes serialize per budget id; reads serve a lock-free cached snapshot
//! while it is fresh. A usage record committed before a status computation
//! is always visible in that computation.

use crate::error::BudgetError;
use crate::model::{
    BudgetAlert, BudgetDefinition, BudgetStatusSnapshot, ConstraintDecision, ConstraintOutcome,
    ConstraintReport, ScopeRef, ThresholdAction, ThresholdKind, UsageRecord, UsageSummary,
};
use crate::store::BudgetStore;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use relay_core::{BudgetHealth, BudgetId, ScopeTuple};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const SECONDS_PER_DAY: i64 = 86_400;

/// Tracker over the usage ledger and the status cache.
pub struct BudgetTracker {
    store: Arc<dyn BudgetStore>,
    status_cache: DashMap<BudgetId, BudgetStatusSnapshot>,
    write_locks: DashMap<BudgetId, Arc<Mutex<()>>>,
    freshness: Duration,
}

impl BudgetTracker {
    /// Create a tracker with the default five-minute freshness window.
    #[must_use]
    pub fn new(store: Arc<dyn BudgetStore>) -> Self {
        Self::with_freshness(store, Duration::from_secs(300))
    }

    /// Create a tracker with an explicit freshness window.
    #[must_use]
    pub fn with_freshness(store: Arc<dyn BudgetStore>, freshness: Duration) -> Self {
        Self {
            store,
            status_cache: DashMap::new(),
            write_locks: DashMap::new(),
            freshness,
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn store_ref(&self) -> &Arc<dyn BudgetStore> {
        &self.store
    }

    fn lock_for(&self, budget_id: &BudgetId) -> Arc<Mutex<()>> {
        self.write_locks
            .entry(budget_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Record usage against a budget.
    ///
    /// Appends the record (idempotent per `(budget, request)`), recomputes
    /// the budget's status, and evaluates threshold alerts.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown budget or store errors.
    pub async fn record_usage(
        &self,
        record: UsageRecord,
    ) -> Result<BudgetStatusSnapshot, BudgetError> {
        let budget = self
            .store
            .get_budget(&record.budget_id)
            .await?
            .ok_or_else(|| BudgetError::NotFound(record.budget_id.clone()))?;

        let lock = self.lock_for(&budget.id);
        let _guard = lock.lock().await;

        let before = self.compute_status(&budget).await?;

        // Stamp the snapshot the ledger entry will carry
        let mut record = record;
        let percent_after = percent_of(
            before.current_amount + record.cost,
            budget.limit,
        );
        record.status_snapshot = derive_status(&budget, percent_after);

        let inserted = self.store.append_usage(record.clone()).await?;
        if !inserted {
            debug!(
                budget_id = %budget.id,
                request_id = %record.request_id,
                "Duplicate usage record ignored"
            );
            self.status_cache.insert(budget.id.clone(), before.clone());
            return Ok(before);
        }

        debug!(
            budget_id = %budget.id,
            request_id = %record.request_id,
            cost = %record.cost,
            "Usage recorded"
        );

        let mut after = self.compute_status(&budget).await?;
        self.evaluate_alerts(&budget, before.percent_used, &mut after)
            .await?;

        self.status_cache.insert(budget.id.clone(), after.clone());
        Ok(after)
    }

    /// Current status, served from cache while fresh.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown budget or store errors.
    pub async fn get_status(
        &self,
        budget_id: &BudgetId,
    ) -> Result<BudgetStatusSnapshot, BudgetError> {
        if let Some(cached) = self.status_cache.get(budget_id) {
            let age = Utc::now() - cached.last_updated;
            if age.to_std().map_or(false, |age| age < self.freshness) {
                return Ok(cached.clone());
            }
        }
        self.refresh(budget_id).await
    }

    /// Force a status recomputation.
    ///
    /// Idempotent under concurrent callers: recomputations for one budget
    /// serialize, and each derives from the same ledger.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown budget or store errors.
    pub async fn refresh(
        &self,
        budget_id: &BudgetId,
    ) -> Result<BudgetStatusSnapshot, BudgetError> {
        let budget = self
            .store
            .get_budget(budget_id)
            .await?
            .ok_or_else(|| BudgetError::NotFound(budget_id.clone()))?;

        let lock = self.lock_for(budget_id);
        let _guard = lock.lock().await;

        let status = self.compute_status(&budget).await?;
        self.status_cache.insert(budget_id.clone(), status.clone());
        Ok(status)
    }

    /// Usage records for a budget within a window.
    ///
    /// # Errors
    /// Returns store errors.
    pub async fn usage(
        &self,
        budget_id: &BudgetId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<UsageRecord>, BudgetError> {
        self.store.usage_in_window(budget_id, from, to).await
    }

    /// Aggregated usage for a budget within a window.
    ///
    /// # Errors
    /// Returns store errors.
    pub async fn usage_summary(
        &self,
        budget_id: &BudgetId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<UsageSummary, BudgetError> {
        let records = self.store.usage_in_window(budget_id, from, to).await?;
        let mut summary = UsageSummary::default();
        for record in &records {
            summary.add(record);
        }
        Ok(summary)
    }

    /// Every enabled budget whose period covers now and whose scope matches
    /// a dimension of the tuple.
    ///
    /// # Errors
    /// Returns store errors.
    pub async fn applicable_budgets(
        &self,
        scope: &ScopeTuple,
    ) -> Result<Vec<BudgetDefinition>, BudgetError> {
        let now = Utc::now();
        let mut applicable = Vec::new();

        for (kind, id) in scope.dimensions() {
            let budgets = self.store.list_by_scope(&ScopeRef::new(kind, id)).await?;
            for budget in budgets {
                if budget.enabled && now >= budget.start_date && now <= budget.end_date {
                    applicable.push(budget);
                }
            }
        }

        Ok(applicable)
    }

    /// Check an estimated cost against every budget applicable to a scope
    /// tuple, aggregating to the most restrictive outcome.
    ///
    /// An approval requirement is waived when the caller holds one of the
    /// budget's override roles.
    ///
    /// # Errors
    /// Returns store errors.
    pub async fn check_constraints(
        &self,
        scope: &ScopeTuple,
        estimated_cost: Decimal,
        roles: &[String],
    ) -> Result<ConstraintReport, BudgetError> {
        let mut outcomes = Vec::new();

        for budget in self.applicable_budgets(scope).await? {
            let status = self.get_status(&budget.id).await?;
            let mut outcome = decide(&budget, &status, estimated_cost);

            if outcome.decision == ConstraintDecision::RequireApproval
                && budget.allows_override_for(roles)
            {
                outcome.decision = ConstraintDecision::Allow;
                outcome.reason = format!("{} (override role present)", outcome.reason);
            }

            outcomes.push(outcome);
        }

        let report = ConstraintReport::aggregate(outcomes);
        if report.decision != ConstraintDecision::Allow {
            debug!(
                decision = ?report.decision,
                reason = %report.reason,
                "Constraint check restricted a request"
            );
        }
        Ok(report)
    }

    async fn compute_status(
        &self,
        budget: &BudgetDefinition,
    ) -> Result<BudgetStatusSnapshot, BudgetError> {
        let now = Utc::now();
        let window_end = budget.end_date.min(now);
        let records = self
            .store
            .usage_in_window(&budget.id, budget.start_date, window_end)
            .await?;

        let current_amount: Decimal = records.iter().map(|record| record.cost).sum();
        let percent_used = percent_of(current_amount, budget.limit);

        let elapsed_seconds = (now - budget.start_date).num_seconds().max(0);
        let elapsed_days =
            (Decimal::from(elapsed_seconds) / Decimal::from(SECONDS_PER_DAY)).max(Decimal::ONE);
        let burn_rate_per_day = current_amount / elapsed_days;

        let remaining_seconds = (budget.end_date - now).num_seconds().max(0);
        let remaining_days = Decimal::from(remaining_seconds) / Decimal::from(SECONDS_PER_DAY);
        let projected_total = current_amount + burn_rate_per_day * remaining_days;

        let active_alerts = self
            .store
            .unresolved_alerts(&budget.id)
            .await?
            .into_iter()
            .map(|alert| alert.kind)
            .collect();

        Ok(BudgetStatusSnapshot {
            budget_id: budget.id.clone(),
            current_amount,
            remaining: (budget.limit - current_amount).max(Decimal::ZERO),
            percent_used,
            burn_rate_per_day,
            projected_total,
            status: derive_status(budget, percent_used),
            active_alerts,
            last_updated: now,
        })
    }

    async fn evaluate_alerts(
        &self,
        budget: &BudgetDefinition,
        percent_before: Decimal,
        after: &mut BudgetStatusSnapshot,
    ) -> Result<(), BudgetError> {
        let unresolved = self.store.unresolved_alerts(&budget.id).await?;

        for kind in [
            ThresholdKind::Warning,
            ThresholdKind::Critical,
            ThresholdKind::Exceeded,
        ] {
            let threshold = budget.threshold_percent(kind);
            let newly_crossed = percent_before < threshold && after.percent_used >= threshold;
            let already_open = unresolved.iter().any(|alert| alert.kind == kind);

            if newly_crossed && !already_open {
                let actions = budget.actions_for(kind).to_vec();
                let alert = BudgetAlert::new(
                    budget.id.clone(),
                    kind,
                    after.percent_used,
                    actions.clone(),
                    format!(
                        "budget '{}' crossed {kind:?} threshold at {:.1}% used",
                        budget.name, after.percent_used
                    ),
                );

                warn!(
                    budget_id = %budget.id,
                    kind = ?kind,
                    percent_used = %after.percent_used,
                    scheduled_actions = ?actions,
                    "Budget threshold crossed"
                );

                self.store.append_alert(alert).await?;
                after.active_alerts.push(kind);
            }
        }

        Ok(())
    }
}

fn percent_of(amount: Decimal, limit: Decimal) -> Decimal {
    if limit > Decimal::ZERO {
        amount / limit * Decimal::ONE_HUNDRED
    } else if amount > Decimal::ZERO {
        Decimal::ONE_HUNDRED
    } else {
        Decimal::ZERO
    }
}

fn derive_status(budget: &BudgetDefinition, percent_used: Decimal) -> BudgetHealth {
    if percent_used >= Decimal::ONE_HUNDRED {
        BudgetHealth::Exceeded
    } else if percent_used >= budget.critical_threshold {
        BudgetHealth::Critical
    } else if percent_used >= budget.warning_threshold {
        BudgetHealth::Warning
    } else {
        BudgetHealth::Normal
    }
}

/// Map one budget's status and the estimated cost onto a decision.
///
/// Configured threshold actions steer the decision; with nothing
/// configured the defaults are: exceeded denies, critical downgrades,
/// warning allows.
fn decide(
    budget: &BudgetDefinition,
    status: &BudgetStatusSnapshot,
    estimated_cost: Decimal,
) -> ConstraintOutcome {
    let projected_percent = percent_of(status.current_amount + estimated_cost, budget.limit);

    let (kind, default_decision) = if projected_percent >= Decimal::ONE_HUNDRED {
        (ThresholdKind::Exceeded, ConstraintDecision::Deny)
    } else if projected_percent >= budget.critical_threshold {
        (ThresholdKind::Critical, ConstraintDecision::AllowWithDowngrade)
    } else if projected_percent >= budget.warning_threshold {
        (ThresholdKind::Warning, ConstraintDecision::Allow)
    } else {
        return ConstraintOutcome {
            budget_id: budget.id.clone(),
            decision: ConstraintDecision::Allow,
            reason: format!(
                "budget '{}' at {:.1}% after estimated cost",
                budget.name, projected_percent
            ),
            suggested_actions: Vec::new(),
        };
    };

    let actions = budget.actions_for(kind);
    let decision = actions
        .iter()
        .map(|action| decision_for_action(*action))
        .max()
        .unwrap_or(default_decision);

    ConstraintOutcome {
        budget_id: budget.id.clone(),
        decision,
        reason: format!(
            "budget '{}' would reach {:.1}% of its limit ({kind:?})",
            budget.name, projected_percent
        ),
        suggested_actions: actions.to_vec(),
    }
}

fn decision_for_action(action: ThresholdAction) -> ConstraintDecision {
    match action {
        ThresholdAction::Notify => ConstraintDecision::Allow,
        ThresholdAction::RestrictModels | ThresholdAction::AutoDowngrade => {
            ConstraintDecision::AllowWithDowngrade
        }
        ThresholdAction::RequireApproval => ConstraintDecision::RequireApproval,
        ThresholdAction::BlockAll => ConstraintDecision::Deny,
    }
}
