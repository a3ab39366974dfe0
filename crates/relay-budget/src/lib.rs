//! # Relay Budget
//!
//! The budget subsystem: hierarchical budget definitions across scopes, an
//! append-only usage ledger, a serially-updated status cache, threshold
//! alerts, and real-time constraint checks.
//!
//! Persistence drivers are external collaborators; this crate ships the
//! store trait, an in-memory store, and the SQL schema contracts.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod model;
pub mod outbox;
pub mod registry;
pub mod schema;
pub mod store;
pub mod tracker;

// Re-export main types
pub use error::BudgetError;
pub use model::{
    BudgetAlert, BudgetDefinition, BudgetDraft, BudgetPeriod, BudgetStatusSnapshot,
    ConstraintDecision, ConstraintOutcome, ConstraintReport, ScopeRef, ThresholdAction, ThresholdKind,
    UsageRecord, UsageSummary,
};
pub use outbox::UsageOutbox;
pub use registry::{BudgetHierarchy, BudgetRegistry};
pub use store::{BudgetStore, InMemoryBudgetStore};
pub use tracker::BudgetTracker;
