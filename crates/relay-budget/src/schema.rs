//! Persisted-state schema contracts.
//!
//! Persistence drivers are external collaborators; these DDL constants are
//! the contract they must satisfy. The status cache table is advisory:
//! every value in it derives from the usage ledger.

/// `budget_definitions` table.
pub const BUDGET_DEFINITIONS: &str = r#"
CREATE TABLE IF NOT EXISTS budget_definitions (
    id VARCHAR(64) PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    scope_type VARCHAR(20) NOT NULL,
    scope_id VARCHAR(255) NOT NULL,
    limit_amount NUMERIC(20, 6) NOT NULL,
    currency CHAR(3) NOT NULL,
    period VARCHAR(20) NOT NULL,
    start_date TIMESTAMPTZ NOT NULL,
    end_date TIMESTAMPTZ NOT NULL,
    recurring BOOLEAN NOT NULL DEFAULT FALSE,
    warning_threshold NUMERIC(5, 2) NOT NULL,
    critical_threshold NUMERIC(5, 2) NOT NULL,
    warning_actions JSONB NOT NULL DEFAULT '[]',
    critical_actions JSONB NOT NULL DEFAULT '[]',
    exceeded_actions JSONB NOT NULL DEFAULT '[]',
    allow_overrides BOOLEAN NOT NULL DEFAULT FALSE,
    override_roles JSONB NOT NULL DEFAULT '[]',
    parent_id VARCHAR(64) REFERENCES budget_definitions(id),
    enabled BOOLEAN NOT NULL DEFAULT TRUE,
    created_by VARCHAR(255) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT thresholds_ordered
        CHECK (warning_threshold >= 0
           AND warning_threshold <= critical_threshold
           AND critical_threshold <= 100),
    CONSTRAINT period_ordered CHECK (end_date > start_date)
);

CREATE INDEX IF NOT EXISTS idx_budget_definitions_scope
    ON budget_definitions(scope_type, scope_id);
CREATE INDEX IF NOT EXISTS idx_budget_definitions_parent
    ON budget_definitions(parent_id);
"#;

/// `budget_usage_records` table. One row per billed request per budget;
/// `request_id` is unique within a budget so recording stays idempotent.
pub const BUDGET_USAGE_RECORDS: &str = r#"
CREATE TABLE IF NOT EXISTS budget_usage_records (
    usage_id VARCHAR(64) PRIMARY KEY,
    budget_id VARCHAR(64) NOT NULL REFERENCES budget_definitions(id),
    request_id VARCHAR(64) NOT NULL,
    user_id VARCHAR(255),
    team_id VARCHAR(255),
    organization_id VARCHAR(255),
    project_id VARCHAR(255),
    provider VARCHAR(64) NOT NULL,
    model VARCHAR(128) NOT NULL,
    input_tokens INTEGER NOT NULL,
    output_tokens INTEGER NOT NULL,
    cost NUMERIC(20, 6) NOT NULL,
    currency CHAR(3) NOT NULL,
    timestamp TIMESTAMPTZ NOT NULL,
    original_model VARCHAR(128),
    downgraded BOOLEAN NOT NULL DEFAULT FALSE,
    status_snapshot VARCHAR(16) NOT NULL,
    cache_status VARCHAR(16) NOT NULL DEFAULT 'miss',
    CONSTRAINT usage_request_once UNIQUE (budget_id, request_id)
);

CREATE INDEX IF NOT EXISTS idx_budget_usage_budget_id
    ON budget_usage_records(budget_id);
CREATE INDEX IF NOT EXISTS idx_budget_usage_timestamp
    ON budget_usage_records(timestamp);
CREATE INDEX IF NOT EXISTS idx_budget_usage_scope
    ON budget_usage_records(organization_id, team_id, user_id, project_id);
"#;

/// `budget_alert_history` table.
pub const BUDGET_ALERT_HISTORY: &str = r#"
CREATE TABLE IF NOT EXISTS budget_alert_history (
    alert_id VARCHAR(64) PRIMARY KEY,
    budget_id VARCHAR(64) NOT NULL REFERENCES budget_definitions(id),
    kind VARCHAR(16) NOT NULL,
    percent_used NUMERIC(7, 2) NOT NULL,
    actions JSONB NOT NULL DEFAULT '[]',
    message TEXT NOT NULL,
    triggered_at TIMESTAMPTZ NOT NULL,
    resolved BOOLEAN NOT NULL DEFAULT FALSE
);

CREATE INDEX IF NOT EXISTS idx_budget_alerts_budget_id
    ON budget_alert_history(budget_id);
CREATE INDEX IF NOT EXISTS idx_budget_alerts_unresolved
    ON budget_alert_history(budget_id, kind) WHERE NOT resolved;
"#;

/// `budget_status_cache` table. Advisory: derivable from the ledger.
pub const BUDGET_STATUS_CACHE: &str = r#"
CREATE TABLE IF NOT EXISTS budget_status_cache (
    budget_id VARCHAR(64) PRIMARY KEY REFERENCES budget_definitions(id),
    current_amount NUMERIC(20, 6) NOT NULL,
    remaining NUMERIC(20, 6) NOT NULL,
    percent_used NUMERIC(7, 2) NOT NULL,
    burn_rate_per_day NUMERIC(20, 6) NOT NULL,
    projected_total NUMERIC(20, 6) NOT NULL,
    status VARCHAR(16) NOT NULL,
    last_updated TIMESTAMPTZ NOT NULL
);
"#;

/// All schema contracts in creation order.
#[must_use]
pub fn all() -> Vec<(&'static str, &'static str)> {
    vec![
        ("budget_definitions", BUDGET_DEFINITIONS),
        ("budget_usage_records", BUDGET_USAGE_RECORDS),
        ("budget_alert_history", BUDGET_ALERT_HISTORY),
        ("budget_status_cache", BUDGET_STATUS_CACHE),
    ]
}
