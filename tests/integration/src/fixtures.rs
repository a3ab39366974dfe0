//! Test fixtures: a programmable stub adapter and a fully assembled
//! pipeline harness.

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_budget::{
    BudgetDraft, BudgetPeriod, BudgetRegistry, BudgetTracker, InMemoryBudgetStore, ScopeRef,
    ThresholdAction, UsageOutbox, UsageRecord,
};
use relay_cache::{ResponseCache, ResponseCacheConfig};
use relay_core::{
    AdapterHealth, BudgetId, Capability, ChatMessage, Deadline, FinishReason, ModelId,
    ModelOutput, ProviderAdapter, ProviderCall, ProviderErrorKind, ProviderId, QualityTier,
    RelayError, RequestId, ScopeKind, ScopeTuple, TokenUsage,
};
use relay_pipeline::{PipelineConfig, RequestPipeline};
use relay_providers::{ProviderProfile, ProviderRegistry};
use relay_steering::SteeringEngine;
use relay_telemetry::Metrics;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Tokens every stub response reports.
pub const STUB_INPUT_TOKENS: u32 = 100;
/// Output tokens every stub response reports.
pub const STUB_OUTPUT_TOKENS: u32 = 50;

/// A programmable adapter: answers for every model, can be told to fail
/// specific models, and counts its calls.
pub struct StubAdapter {
    id: ProviderId,
    calls: AtomicU32,
    failing: Mutex<HashSet<String>>,
}

impl StubAdapter {
    /// Create a stub fronting one provider id.
    pub fn new(id: &str) -> Self {
        Self {
            id: ProviderId::new(id),
            calls: AtomicU32::new(0),
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Make calls against a model fail with a retryable error.
    pub fn fail_model(&self, model: &str) {
        self.failing.lock().insert(model.to_string());
    }

    /// Number of calls dispatched through this adapter.
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for StubAdapter {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    async fn call(
        &self,
        request: &ProviderCall,
        _deadline: Deadline,
    ) -> Result<ModelOutput, RelayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.failing.lock().contains(request.model.as_str()) {
            return Err(RelayError::provider(
                self.id.clone(),
                ProviderErrorKind::Fatal,
                "stubbed failure",
                Some(500),
            ));
        }

        Ok(ModelOutput {
            content: format!("answer from {}", request.model),
            usage: TokenUsage::new(STUB_INPUT_TOKENS, STUB_OUTPUT_TOKENS),
            finish_reason: FinishReason::Stop,
            model_used: request.model.as_str().to_string(),
        })
    }

    async fn health(&self) -> AdapterHealth {
        AdapterHealth::healthy()
    }

    fn supports(&self, _capability: Capability) -> bool {
        true
    }
}

/// The assembled pipeline with handles on every subsystem.
pub struct TestHarness {
    /// The pipeline under test
    pub pipeline: RequestPipeline,
    /// The budget store, for ledger assertions
    pub store: Arc<InMemoryBudgetStore>,
    /// The budget registry, for creating budgets
    pub budgets: BudgetRegistry,
    /// The budget tracker
    pub tracker: Arc<BudgetTracker>,
    /// The provider registry, for health manipulation
    pub providers: Arc<ProviderRegistry>,
    /// The stub adapter, for call counting and failure injection
    pub adapter: Arc<StubAdapter>,
}

impl TestHarness {
    /// A harness with the default three-model profile set and no rules.
    pub fn new() -> Self {
        Self::with_rules(
            r#"
version: "1"
name: empty
rules: []
"#,
        )
    }

    /// A harness with the default profiles and the given rule set.
    pub fn with_rules(rules_yaml: &str) -> Self {
        let adapter = Arc::new(StubAdapter::new("openai"));

        let providers = Arc::new(ProviderRegistry::new());
        providers.register_adapter(adapter.clone());
        providers
            .load_profiles(default_profiles())
            .expect("profiles load");

        let steering = Arc::new(SteeringEngine::from_yaml(rules_yaml).expect("rules compile"));

        let store = Arc::new(InMemoryBudgetStore::new());
        let budgets = BudgetRegistry::new(store.clone() as Arc<dyn relay_budget::BudgetStore>);
        let tracker = Arc::new(BudgetTracker::new(
            store.clone() as Arc<dyn relay_budget::BudgetStore>
        ));
        let (outbox, _worker) = UsageOutbox::spawn(Arc::clone(&tracker));

        let cache = Arc::new(ResponseCache::new(ResponseCacheConfig::default()));
        let metrics = Arc::new(Metrics::new().expect("metrics"));

        let pipeline = RequestPipeline::new(
            Arc::clone(&providers),
            steering,
            Arc::clone(&tracker),
            cache,
            outbox,
            metrics,
            PipelineConfig::default(),
        );

        Self {
            pipeline,
            store,
            budgets,
            tracker,
            providers,
            adapter,
        }
    }

    /// Create a team budget and return its id.
    pub async fn create_team_budget(
        &self,
        limit: Decimal,
        warning: Decimal,
        critical: Decimal,
    ) -> BudgetId {
        let budget = self
            .budgets
            .create(
                BudgetDraft {
                    name: "team budget".to_string(),
                    scope: ScopeRef::new(ScopeKind::Team, "team-1"),
                    limit,
                    currency: "USD".to_string(),
                    period: BudgetPeriod::Monthly,
                    start_date: None,
                    end_date: None,
                    recurring: true,
                    warning_threshold: warning,
                    critical_threshold: critical,
                    warning_actions: vec![ThresholdAction::Notify],
                    critical_actions: vec![ThresholdAction::AutoDowngrade],
                    exceeded_actions: vec![ThresholdAction::BlockAll],
                    allow_overrides: false,
                    override_roles: vec![],
                    parent_id: None,
                },
                "tests",
            )
            .await
            .expect("budget create");
        budget.id
    }

    /// Seed spend into a budget so thresholds are already near.
    pub async fn seed_spend(&self, budget_id: &BudgetId, amount: Decimal) {
        self.tracker
            .record_usage(UsageRecord::new(
                budget_id.clone(),
                RequestId::new(format!("seed-{amount}")),
                team_scope(),
                ProviderId::new("openai"),
                ModelId::new("gpt-4-turbo"),
                0,
                0,
                amount,
                "USD",
            ))
            .await
            .expect("seed usage");
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// The scope tuple every test request bills against.
pub fn team_scope() -> ScopeTuple {
    ScopeTuple {
        team_id: Some("team-1".to_string()),
        ..Default::default()
    }
}

/// The default model catalogue: a premium model with fallbacks, a cheap
/// economy model, and a standard model.
pub fn default_profiles() -> Vec<ProviderProfile> {
    vec![
        ProviderProfile::new("openai", "gpt-4-turbo")
            .with_pricing(dec!(0.00001), dec!(0.00003))
            .with_latency(Duration::from_millis(2500))
            .with_quality_tier(QualityTier::Premium)
            .with_fallbacks(vec![
                ModelId::new("gpt-3.5-turbo"),
                ModelId::new("claude-3-sonnet"),
            ]),
        ProviderProfile::new("openai", "gpt-3.5-turbo")
            .with_pricing(dec!(0.0000015), dec!(0.000002))
            .with_latency(Duration::from_millis(800))
            .with_quality_tier(QualityTier::Economy),
        ProviderProfile::new("openai", "claude-3-sonnet")
            .with_pricing(dec!(0.000003), dec!(0.000015))
            .with_latency(Duration::from_millis(1200))
            .with_quality_tier(QualityTier::Standard),
    ]
}

/// A chat request billed to the team scope.
pub fn team_request(content: &str) -> relay_core::RelayRequest {
    relay_core::RelayRequest::builder()
        .messages(vec![ChatMessage::user(content)])
        .metadata(relay_core::RequestMetadata {
            team_id: Some("team-1".to_string()),
            ..Default::default()
        })
        .build()
        .expect("request build")
}
