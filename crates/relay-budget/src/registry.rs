//! Budget definition lifecycle.
//!
//! Create/read/update/delete plus list-by-scope and hierarchy traversal.
//! Deletion soft-disables by default; purging is a separate, explicit
//! operation.

use crate::error::BudgetError;
use crate::model::{BudgetDefinition, BudgetDraft, ScopeRef};
use crate::store::BudgetStore;
use chrono::Utc;
use relay_core::BudgetId;
use std::sync::Arc;
use tracing::{debug, info};

/// A budget with its immediate family.
#[derive(Debug, Clone)]
pub struct BudgetHierarchy {
    /// The budget itself
    pub budget: BudgetDefinition,
    /// Ancestors, nearest first
    pub ancestors: Vec<BudgetDefinition>,
    /// Direct children
    pub children: Vec<BudgetDefinition>,
}

/// Registry owning budget definitions and their lifecycle.
pub struct BudgetRegistry {
    store: Arc<dyn BudgetStore>,
}

impl BudgetRegistry {
    /// Create a registry over a store.
    #[must_use]
    pub fn new(store: Arc<dyn BudgetStore>) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn BudgetStore> {
        &self.store
    }

    /// Create a budget from a draft.
    ///
    /// # Errors
    /// Returns validation errors from the draft, or `NotFound` when the
    /// parent does not exist.
    pub async fn create(
        &self,
        draft: BudgetDraft,
        created_by: impl Into<String>,
    ) -> Result<BudgetDefinition, BudgetError> {
        let now = Utc::now();
        let (start_date, end_date) = draft.validate(now)?;

        if let Some(ref parent_id) = draft.parent_id {
            if self.store.get_budget(parent_id).await?.is_none() {
                return Err(BudgetError::NotFound(parent_id.clone()));
            }
        }

        let budget = BudgetDefinition {
            id: BudgetId::generate(),
            name: draft.name,
            scope: draft.scope,
            limit: draft.limit,
            currency: draft.currency,
            period: draft.period,
            start_date,
            end_date,
            recurring: draft.recurring,
            warning_threshold: draft.warning_threshold,
            critical_threshold: draft.critical_threshold,
            warning_actions: draft.warning_actions,
            critical_actions: draft.critical_actions,
            exceeded_actions: draft.exceeded_actions,
            allow_overrides: draft.allow_overrides,
            override_roles: draft.override_roles,
            parent_id: draft.parent_id,
            enabled: true,
            created_by: created_by.into(),
            created_at: now,
            updated_at: now,
        };

        info!(
            budget_id = %budget.id,
            scope = %budget.scope.scope_type,
            scope_id = %budget.scope.scope_id,
            limit = %budget.limit,
            "Budget created"
        );

        self.store.put_budget(budget.clone()).await?;
        Ok(budget)
    }

    /// Fetch a budget.
    ///
    /// # Errors
    /// Returns `NotFound` when no such budget exists.
    pub async fn get(&self, id: &BudgetId) -> Result<BudgetDefinition, BudgetError> {
        self.store
            .get_budget(id)
            .await?
            .ok_or_else(|| BudgetError::NotFound(id.clone()))
    }

    /// Replace a budget's definition from a draft, keeping identity and
    /// creation metadata.
    ///
    /// # Errors
    /// Returns `NotFound` or draft validation errors.
    pub async fn update(
        &self,
        id: &BudgetId,
        draft: BudgetDraft,
    ) -> Result<BudgetDefinition, BudgetError> {
        let existing = self.get(id).await?;
        let now = Utc::now();
        let (start_date, end_date) = draft.validate(now)?;

        let updated = BudgetDefinition {
            id: existing.id.clone(),
            name: draft.name,
            scope: draft.scope,
            limit: draft.limit,
            currency: draft.currency,
            period: draft.period,
            start_date,
            end_date,
            recurring: draft.recurring,
            warning_threshold: draft.warning_threshold,
            critical_threshold: draft.critical_threshold,
            warning_actions: draft.warning_actions,
            critical_actions: draft.critical_actions,
            exceeded_actions: draft.exceeded_actions,
            allow_overrides: draft.allow_overrides,
            override_roles: draft.override_roles,
            parent_id: draft.parent_id,
            enabled: existing.enabled,
            created_by: existing.created_by,
            created_at: existing.created_at,
            updated_at: now,
        };

        debug!(budget_id = %id, "Budget updated");
        self.store.put_budget(updated.clone()).await?;
        Ok(updated)
    }

    /// Soft-disable a budget. Disabled budgets are skipped by constraint
    /// checks but keep their ledger.
    ///
    /// # Errors
    /// Returns `NotFound` when no such budget exists.
    pub async fn disable(&self, id: &BudgetId) -> Result<(), BudgetError> {
        let mut budget = self.get(id).await?;
        budget.enabled = false;
        budget.updated_at = Utc::now();
        info!(budget_id = %id, "Budget disabled");
        self.store.put_budget(budget).await
    }

    /// Remove a budget outright.
    ///
    /// # Errors
    /// Returns `NotFound` when no such budget exists.
    pub async fn purge(&self, id: &BudgetId) -> Result<(), BudgetError> {
        if !self.store.remove_budget(id).await? {
            return Err(BudgetError::NotFound(id.clone()));
        }
        info!(budget_id = %id, "Budget purged");
        Ok(())
    }

    /// All budgets.
    ///
    /// # Errors
    /// Returns store errors.
    pub async fn list(&self) -> Result<Vec<BudgetDefinition>, BudgetError> {
        self.store.list_budgets().await
    }

    /// Budgets for one scope.
    ///
    /// # Errors
    /// Returns store errors.
    pub async fn list_by_scope(
        &self,
        scope: &ScopeRef,
    ) -> Result<Vec<BudgetDefinition>, BudgetError> {
        self.store.list_by_scope(scope).await
    }

    /// A budget with its ancestors and direct children.
    ///
    /// # Errors
    /// Returns `NotFound` when the root budget does not exist.
    pub async fn hierarchy(&self, id: &BudgetId) -> Result<BudgetHierarchy, BudgetError> {
        let budget = self.get(id).await?;

        let mut ancestors = Vec::new();
        let mut cursor = budget.parent_id.clone();
        while let Some(parent_id) = cursor {
            // A cycle in parent links would loop forever; stop if we see the root again
            if parent_id == budget.id || ancestors.iter().any(|a: &BudgetDefinition| a.id == parent_id) {
                break;
            }
            match self.store.get_budget(&parent_id).await? {
                Some(parent) => {
                    cursor = parent.parent_id.clone();
                    ancestors.push(parent);
                }
                None => break,
            }
        }

        let children = self
            .store
            .list_budgets()
            .await?
            .into_iter()
            .filter(|candidate| candidate.parent_id.as_ref() == Some(&budget.id))
            .collect();

        Ok(BudgetHierarchy {
            budget,
            ancestors,
            children,
        })
    }
}
