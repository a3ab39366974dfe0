//! End-to-end pipeline scenarios against stub adapters.

use crate::fixtures::*;
use chrono::Utc;
use relay_budget::{BudgetDraft, BudgetPeriod, ScopeRef, ThresholdAction};
use relay_core::{
    BudgetHealth, CacheControl, CacheMode, CacheStatus, ModelId, OptimizeLevel, RelayError,
    ScopeKind,
};
use relay_pipeline::RequestOptions;
use rust_decimal_macros::dec;
use std::time::Duration;

fn bypass_options() -> RequestOptions {
    RequestOptions {
        cache: CacheControl {
            mode: CacheMode::Bypass,
            ttl_override: None,
        },
        ..Default::default()
    }
}

/// Scenario: cost-based downgrade. A nearly-spent budget downgrades a
/// premium request to the cheapest model and records the downgrade.
#[tokio::test]
async fn test_cost_based_downgrade() {
    let harness = TestHarness::new();
    let budget_id = harness
        .create_team_budget(dec!(1000), dec!(70), dec!(90))
        .await;
    harness.seed_spend(&budget_id, dec!(990)).await;

    let mut request = team_request("Summarize the quarterly report");
    request.constraints.preferred_model = Some(ModelId::new("gpt-4-turbo"));

    let response = harness
        .pipeline
        .handle(request, RequestOptions::default())
        .await
        .expect("handled");

    assert_eq!(response.selected_model.as_str(), "gpt-3.5-turbo");
    assert_eq!(response.budget_impact.status, BudgetHealth::Critical);

    let records = harness
        .tracker
        .usage(
            &budget_id,
            Utc::now() - chrono::Duration::hours(1),
            Utc::now(),
        )
        .await
        .expect("usage");
    let downgrade = records
        .iter()
        .find(|record| record.downgraded)
        .expect("downgraded record");
    assert_eq!(
        downgrade.original_model.as_ref().map(ModelId::as_str),
        Some("gpt-4-turbo")
    );
    assert_eq!(downgrade.model.as_str(), "gpt-3.5-turbo");
}

/// Scenario: fallback chain. An unhealthy primary is skipped and the
/// fallback list is walked in order.
#[tokio::test]
async fn test_fallback_chain_on_unhealthy_primary() {
    let harness = TestHarness::new();
    harness
        .providers
        .set_health(&ModelId::new("gpt-4-turbo"), false);

    let mut request = team_request("Hello");
    request.constraints.preferred_model = Some(ModelId::new("gpt-4-turbo"));

    let response = harness
        .pipeline
        .handle(request, bypass_options())
        .await
        .expect("handled");

    assert_eq!(response.selected_model.as_str(), "gpt-3.5-turbo");
    assert_eq!(
        response.fallback_chain,
        vec![ModelId::new("gpt-3.5-turbo")]
    );
    assert_eq!(response.output.content, "answer from gpt-3.5-turbo");
}

/// Failing (rather than unhealthy) primaries land in the attempted chain.
#[tokio::test]
async fn test_fallback_chain_records_attempted_models() {
    let harness = TestHarness::new();
    harness.adapter.fail_model("gpt-4-turbo");

    let mut request = team_request("Hello");
    request.constraints.preferred_model = Some(ModelId::new("gpt-4-turbo"));

    let response = harness
        .pipeline
        .handle(request, bypass_options())
        .await
        .expect("handled");

    assert_eq!(
        response.fallback_chain,
        vec![ModelId::new("gpt-4-turbo"), ModelId::new("gpt-3.5-turbo")]
    );
    assert_eq!(response.selected_model.as_str(), "gpt-3.5-turbo");
}

/// All candidates failing surfaces `ProviderUnavailable` and records no
/// usage.
#[tokio::test]
async fn test_exhausted_fallbacks_record_no_usage() {
    let harness = TestHarness::new();
    let budget_id = harness
        .create_team_budget(dec!(1000), dec!(70), dec!(90))
        .await;
    harness.adapter.fail_model("gpt-4-turbo");
    harness.adapter.fail_model("gpt-3.5-turbo");
    harness.adapter.fail_model("claude-3-sonnet");

    let mut request = team_request("Hello");
    request.constraints.preferred_model = Some(ModelId::new("gpt-4-turbo"));

    let error = harness
        .pipeline
        .handle(request, bypass_options())
        .await
        .expect_err("should exhaust");
    assert!(matches!(error, RelayError::ProviderUnavailable { .. }));

    let records = harness
        .tracker
        .usage(
            &budget_id,
            Utc::now() - chrono::Duration::hours(1),
            Utc::now(),
        )
        .await
        .expect("usage");
    assert!(records.is_empty());
}

/// Scenario: cache hit. Identical requests share a response; the second
/// records a zero-cost entry and never reaches the provider.
#[tokio::test]
async fn test_cache_hit_records_zero_cost_usage() {
    let harness = TestHarness::new();
    let budget_id = harness
        .create_team_budget(dec!(1000), dec!(70), dec!(90))
        .await;

    let first = harness
        .pipeline
        .handle(team_request("What is Rust?"), RequestOptions::default())
        .await
        .expect("first");
    assert_eq!(first.cache_status, CacheStatus::Miss);
    assert!(first.actual_cost > dec!(0));

    let second = harness
        .pipeline
        .handle(team_request("What is Rust?"), RequestOptions::default())
        .await
        .expect("second");
    assert_eq!(second.cache_status, CacheStatus::Hit);
    assert_eq!(second.actual_cost, dec!(0));
    assert_eq!(second.output.content, first.output.content);

    // The provider saw exactly one call
    assert_eq!(harness.adapter.call_count(), 1);

    let records = harness
        .tracker
        .usage(
            &budget_id,
            Utc::now() - chrono::Duration::hours(1),
            Utc::now(),
        )
        .await
        .expect("usage");
    assert_eq!(records.len(), 2);
    let hit = records
        .iter()
        .find(|record| record.cache_status == CacheStatus::Hit)
        .expect("hit record");
    assert_eq!(hit.cost, dec!(0));
}

/// Explicit bypass skips the cache on both sides.
#[tokio::test]
async fn test_cache_bypass_dispatches_every_time() {
    let harness = TestHarness::new();

    let first = harness
        .pipeline
        .handle(team_request("What is Rust?"), bypass_options())
        .await
        .expect("first");
    let second = harness
        .pipeline
        .handle(team_request("What is Rust?"), bypass_options())
        .await
        .expect("second");

    assert_eq!(first.cache_status, CacheStatus::Bypass);
    assert_eq!(second.cache_status, CacheStatus::Bypass);
    assert_eq!(harness.adapter.call_count(), 2);
}

/// Scenario: rule rejection. A matching reject rule terminates the request
/// with the rule's status and message, and nothing is billed.
#[tokio::test]
async fn test_rule_rejection() {
    let harness = TestHarness::with_rules(
        r#"
version: "1"
name: safety
rules:
  - id: block-shutdown
    name: Block shutdown prompts
    priority: 1
    conditions:
      - field: request.body.prompt
        operator: contains
        value: shutdown
    actions:
      - type: reject
        status: 403
        message: forbidden
"#,
    );
    let budget_id = harness
        .create_team_budget(dec!(1000), dec!(70), dec!(90))
        .await;

    let request = relay_core::RelayRequest::builder()
        .prompt("please shutdown the cluster")
        .metadata(relay_core::RequestMetadata {
            team_id: Some("team-1".to_string()),
            ..Default::default()
        })
        .build()
        .expect("request");

    let error = harness
        .pipeline
        .handle(request, RequestOptions::default())
        .await
        .expect_err("should reject");

    match error {
        RelayError::Rejected { status, message } => {
            assert_eq!(status, 403);
            assert_eq!(message, "forbidden");
        }
        other => panic!("expected Rejected, got {other}"),
    }

    let records = harness
        .tracker
        .usage(
            &budget_id,
            Utc::now() - chrono::Duration::hours(1),
            Utc::now(),
        )
        .await
        .expect("usage");
    assert!(records.is_empty());
    assert_eq!(harness.adapter.call_count(), 0);
}

/// A steering route pins provider and model past cost optimization.
#[tokio::test]
async fn test_steering_route_pins_model() {
    let harness = TestHarness::with_rules(
        r#"
version: "1"
name: routing
rules:
  - id: premium-for-analysis
    name: Premium for analysis tasks
    priority: 1
    conditions:
      - field: request.metadata.task_type
        operator: equals
        value: analysis
    actions:
      - type: route
        provider: openai
        model: gpt-4-turbo
"#,
    );

    let mut request = team_request("Analyze this dataset");
    request.metadata.task_type = Some("analysis".to_string());

    let response = harness
        .pipeline
        .handle(request, bypass_options())
        .await
        .expect("handled");

    assert_eq!(response.selected_model.as_str(), "gpt-4-turbo");
}

/// An exceeded budget denies the request outright.
#[tokio::test]
async fn test_budget_denial() {
    let harness = TestHarness::new();
    let budget_id = harness
        .create_team_budget(dec!(100), dec!(70), dec!(90))
        .await;
    harness.seed_spend(&budget_id, dec!(100)).await;

    let error = harness
        .pipeline
        .handle(team_request("Hello"), RequestOptions::default())
        .await
        .expect_err("should deny");

    match &error {
        RelayError::BudgetDenied {
            requires_approval, ..
        } => assert!(!requires_approval),
        other => panic!("expected BudgetDenied, got {other}"),
    }
    assert_eq!(error.status(), 402);
    assert_eq!(harness.adapter.call_count(), 0);
}

/// An approval requirement denies without an override role and admits with
/// one.
#[tokio::test]
async fn test_approval_requirement_and_override() {
    let harness = TestHarness::new();
    let budget = harness
        .budgets
        .create(
            BudgetDraft {
                name: "guarded".to_string(),
                scope: ScopeRef::new(ScopeKind::Team, "team-1"),
                limit: dec!(100),
                currency: "USD".to_string(),
                period: BudgetPeriod::Monthly,
                start_date: None,
                end_date: None,
                recurring: true,
                warning_threshold: dec!(50),
                critical_threshold: dec!(80),
                warning_actions: vec![],
                critical_actions: vec![ThresholdAction::RequireApproval],
                exceeded_actions: vec![ThresholdAction::BlockAll],
                allow_overrides: true,
                override_roles: vec!["finance-admin".to_string()],
                parent_id: None,
            },
            "tests",
        )
        .await
        .expect("budget");
    harness.seed_spend(&budget.id, dec!(85)).await;

    let denied = harness
        .pipeline
        .handle(team_request("Hello"), bypass_options())
        .await
        .expect_err("should require approval");
    match &denied {
        RelayError::BudgetDenied {
            requires_approval, ..
        } => assert!(requires_approval),
        other => panic!("expected BudgetDenied, got {other}"),
    }
    assert_eq!(denied.status(), 403);

    let mut privileged = team_request("Hello");
    privileged.metadata.roles = vec!["finance-admin".to_string()];
    let response = harness
        .pipeline
        .handle(privileged, bypass_options())
        .await
        .expect("override admits");
    assert!(!response.output.content.is_empty());
}

/// Aggressive optimization picks the cheapest eligible model even past a
/// preferred one.
#[tokio::test]
async fn test_aggressive_optimize_minimizes_cost() {
    let harness = TestHarness::new();

    let mut request = team_request("Hello");
    request.constraints.preferred_model = Some(ModelId::new("gpt-4-turbo"));

    let options = RequestOptions {
        optimize: OptimizeLevel::Aggressive,
        cache: CacheControl {
            mode: CacheMode::Bypass,
            ttl_override: None,
        },
    };
    let response = harness
        .pipeline
        .handle(request, options)
        .await
        .expect("handled");

    assert_eq!(response.selected_model.as_str(), "gpt-3.5-turbo");
}

/// An unknown preferred model fails deterministically.
#[tokio::test]
async fn test_unknown_model() {
    let harness = TestHarness::new();

    let mut request = team_request("Hello");
    request.constraints.preferred_model = Some(ModelId::new("gpt-7-hyperdrive"));

    let error = harness
        .pipeline
        .handle(request, RequestOptions::default())
        .await
        .expect_err("should fail");

    assert!(matches!(error, RelayError::UnknownModel { .. }));
    assert_eq!(error.status(), 400);
}

/// A zero deadline cancels before any dispatch.
#[tokio::test]
async fn test_zero_deadline_cancels_before_dispatch() {
    let harness = TestHarness::new();

    let mut request = team_request("Hello");
    request.constraints.max_latency = Some(Duration::ZERO);

    let error = harness
        .pipeline
        .handle(request, RequestOptions::default())
        .await
        .expect_err("should cancel");

    assert!(matches!(error, RelayError::Cancelled { .. }));
    assert_eq!(harness.adapter.call_count(), 0);
}

/// Exactly one usage record exists per billed budget, and its cost matches
/// the cost model's arithmetic.
#[tokio::test]
async fn test_usage_record_cost_matches_cost_model() {
    let harness = TestHarness::new();
    let budget_id = harness
        .create_team_budget(dec!(1000), dec!(70), dec!(90))
        .await;

    let response = harness
        .pipeline
        .handle(team_request("Hello"), bypass_options())
        .await
        .expect("handled");

    let records = harness
        .tracker
        .usage(
            &budget_id,
            Utc::now() - chrono::Duration::hours(1),
            Utc::now(),
        )
        .await
        .expect("usage");
    assert_eq!(records.len(), 1);

    let record = &records[0];
    assert_eq!(record.request_id, response.request_id);
    // 100 input tokens and 50 output tokens at gpt-3.5-turbo prices
    assert_eq!(record.cost, dec!(0.00025));
    assert_eq!(record.cost, response.actual_cost);
    assert_eq!(record.input_tokens, STUB_INPUT_TOKENS);
    assert_eq!(record.output_tokens, STUB_OUTPUT_TOKENS);
}

/// Steering evaluation is deterministic: the same request shape always
/// produces the same selection.
#[tokio::test]
async fn test_identical_requests_select_identically() {
    let harness = TestHarness::new();

    let first = harness
        .pipeline
        .handle(team_request("Hello"), bypass_options())
        .await
        .expect("first");
    let second = harness
        .pipeline
        .handle(team_request("Hello"), bypass_options())
        .await
        .expect("second");

    assert_eq!(first.selected_model, second.selected_model);
    assert_eq!(first.estimated_cost, second.estimated_cost);
}
