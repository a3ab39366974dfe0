//! The budget store contract and its in-memory implementation.
//!
//! Persistence drivers are external; anything that can satisfy this trait
//! (Postgres via the schema contracts, SQLite, a test double) plugs in. The
//! in-memory store keeps whole-store atomicity under one lock, which is the
//! same guarantee the SQL schema achieves with per-operation transactions.

use crate::error::BudgetError;
use crate::model::{BudgetAlert, BudgetDefinition, ScopeRef, ThresholdKind, UsageRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use relay_core::BudgetId;
use std::collections::{HashMap, HashSet};

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, BudgetError>;

/// Durable state behind the budget subsystem.
#[async_trait]
pub trait BudgetStore: Send + Sync {
    /// Insert or replace a budget definition.
    async fn put_budget(&self, budget: BudgetDefinition) -> StoreResult<()>;

    /// Fetch a budget definition.
    async fn get_budget(&self, id: &BudgetId) -> StoreResult<Option<BudgetDefinition>>;

    /// Remove a budget definition outright.
    async fn remove_budget(&self, id: &BudgetId) -> StoreResult<bool>;

    /// All budget definitions.
    async fn list_budgets(&self) -> StoreResult<Vec<BudgetDefinition>>;

    /// Budget definitions for one scope.
    async fn list_by_scope(&self, scope: &ScopeRef) -> StoreResult<Vec<BudgetDefinition>>;

    /// Append a usage record.
    ///
    /// Returns false without writing when a record for the same
    /// `(budget_id, request_id)` already exists; recording is idempotent.
    async fn append_usage(&self, record: UsageRecord) -> StoreResult<bool>;

    /// Usage records for a budget within a time window, inclusive.
    async fn usage_in_window(
        &self,
        budget_id: &BudgetId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<UsageRecord>>;

    /// Append an alert.
    async fn append_alert(&self, alert: BudgetAlert) -> StoreResult<()>;

    /// Unresolved alerts for a budget.
    async fn unresolved_alerts(&self, budget_id: &BudgetId) -> StoreResult<Vec<BudgetAlert>>;

    /// Resolve an alert by id. Returns false when no such alert exists.
    async fn resolve_alert(&self, alert_id: &str) -> StoreResult<bool>;
}

#[derive(Default)]
struct Inner {
    budgets: HashMap<BudgetId, BudgetDefinition>,
    usage: Vec<UsageRecord>,
    usage_keys: HashSet<(BudgetId, String)>,
    alerts: Vec<BudgetAlert>,
}

/// In-memory budget store.
#[derive(Default)]
pub struct InMemoryBudgetStore {
    inner: Mutex<Inner>,
}

impl InMemoryBudgetStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Unresolved alert kinds for a budget, cheap helper for status snapshots.
    #[must_use]
    pub fn unresolved_kinds(&self, budget_id: &BudgetId) -> Vec<ThresholdKind> {
        let inner = self.inner.lock();
        inner
            .alerts
            .iter()
            .filter(|alert| &alert.budget_id == budget_id && !alert.resolved)
            .map(|alert| alert.kind)
            .collect()
    }
}

#[async_trait]
impl BudgetStore for InMemoryBudgetStore {
    async fn put_budget(&self, budget: BudgetDefinition) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.budgets.insert(budget.id.clone(), budget);
        Ok(())
    }

    async fn get_budget(&self, id: &BudgetId) -> StoreResult<Option<BudgetDefinition>> {
        let inner = self.inner.lock();
        Ok(inner.budgets.get(id).cloned())
    }

    async fn remove_budget(&self, id: &BudgetId) -> StoreResult<bool> {
        let mut inner = self.inner.lock();
        Ok(inner.budgets.remove(id).is_some())
    }

    async fn list_budgets(&self) -> StoreResult<Vec<BudgetDefinition>> {
        let inner = self.inner.lock();
        let mut budgets: Vec<_> = inner.budgets.values().cloned().collect();
        budgets.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(budgets)
    }

    async fn list_by_scope(&self, scope: &ScopeRef) -> StoreResult<Vec<BudgetDefinition>> {
        let inner = self.inner.lock();
        let mut budgets: Vec<_> = inner
            .budgets
            .values()
            .filter(|budget| &budget.scope == scope)
            .cloned()
            .collect();
        budgets.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(budgets)
    }

    async fn append_usage(&self, record: UsageRecord) -> StoreResult<bool> {
        let mut inner = self.inner.lock();
        let key = (record.budget_id.clone(), record.request_id.to_string());
        if !inner.usage_keys.insert(key) {
            return Ok(false);
        }
        inner.usage.push(record);
        Ok(true)
    }

    async fn usage_in_window(
        &self,
        budget_id: &BudgetId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<UsageRecord>> {
        let inner = self.inner.lock();
        Ok(inner
            .usage
            .iter()
            .filter(|record| {
                &record.budget_id == budget_id
                    && record.timestamp >= from
                    && record.timestamp <= to
            })
            .cloned()
            .collect())
    }

    async fn append_alert(&self, alert: BudgetAlert) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.alerts.push(alert);
        Ok(())
    }

    async fn unresolved_alerts(&self, budget_id: &BudgetId) -> StoreResult<Vec<BudgetAlert>> {
        let inner = self.inner.lock();
        Ok(inner
            .alerts
            .iter()
            .filter(|alert| &alert.budget_id == budget_id && !alert.resolved)
            .cloned()
            .collect())
    }

    async fn resolve_alert(&self, alert_id: &str) -> StoreResult<bool> {
        let mut inner = self.inner.lock();
        for alert in &mut inner.alerts {
            if alert.alert_id == alert_id {
                alert.resolved = true;
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{ModelId, ProviderId, RequestId, ScopeKind, ScopeTuple};
    use rust_decimal_macros::dec;

    fn record(request_id: &str) -> UsageRecord {
        UsageRecord::new(
            BudgetId::new("b1"),
            RequestId::new(request_id),
            ScopeTuple::user("u1"),
            ProviderId::new("openai"),
            ModelId::new("gpt-3.5-turbo"),
            10,
            5,
            dec!(0.0001),
            "USD",
        )
    }

    #[tokio::test]
    async fn test_append_usage_idempotent_per_request() {
        let store = InMemoryBudgetStore::new();

        assert!(store.append_usage(record("r1")).await.expect("append"));
        // Same request against the same budget is accepted at most once
        assert!(!store.append_usage(record("r1")).await.expect("append"));
        assert!(store.append_usage(record("r2")).await.expect("append"));

        let usage = store
            .usage_in_window(
                &BudgetId::new("b1"),
                Utc::now() - chrono::Duration::hours(1),
                Utc::now() + chrono::Duration::hours(1),
            )
            .await
            .expect("window");
        assert_eq!(usage.len(), 2);
    }

    #[tokio::test]
    async fn test_window_filters_by_time() {
        let store = InMemoryBudgetStore::new();
        let mut old = record("r-old");
        old.timestamp = Utc::now() - chrono::Duration::days(40);
        store.append_usage(old).await.expect("append");
        store.append_usage(record("r-new")).await.expect("append");

        let usage = store
            .usage_in_window(
                &BudgetId::new("b1"),
                Utc::now() - chrono::Duration::days(30),
                Utc::now(),
            )
            .await
            .expect("window");
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].request_id.as_str(), "r-new");
    }

    #[tokio::test]
    async fn test_alert_lifecycle() {
        let store = InMemoryBudgetStore::new();
        let alert = BudgetAlert::new(
            BudgetId::new("b1"),
            ThresholdKind::Warning,
            dec!(75),
            vec![],
            "warning crossed",
        );
        let alert_id = alert.alert_id.clone();
        store.append_alert(alert).await.expect("append");

        let unresolved = store
            .unresolved_alerts(&BudgetId::new("b1"))
            .await
            .expect("unresolved");
        assert_eq!(unresolved.len(), 1);

        assert!(store.resolve_alert(&alert_id).await.expect("resolve"));
        assert!(store
            .unresolved_alerts(&BudgetId::new("b1"))
            .await
            .expect("unresolved")
            .is_empty());
    }

    #[tokio::test]
    async fn test_list_by_scope() {
        let store = InMemoryBudgetStore::new();
        let team_scope = ScopeRef::new(ScopeKind::Team, "team-1");

        // No budgets yet
        assert!(store
            .list_by_scope(&team_scope)
            .await
            .expect("list")
            .is_empty());
    }
}
