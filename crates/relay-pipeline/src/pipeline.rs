//! The request pipeline.
//!
//! One request flows through: validate → admit → estimate → steer → build
//! candidates → budget pre-check → optimize → cache → dispatch → record.
//! Terminal states are succeeded, rejected, denied, and failed; there is no
//! loop back from a failure to dispatch.

use crate::admission::AdmissionControl;
use crate::context::build_context;
use crate::dispatch::{dispatch_with_fallback, DispatchSuccess};
use relay_budget::{BudgetTracker, ConstraintDecision, UsageOutbox, UsageRecord};
use relay_cache::{CacheAdmission, CachedResponse, Fingerprint, ResponseCache};
use relay_core::{
    BudgetImpact, CacheControl, CacheStatus, Capability, CorrelationId, Deadline, ModelId,
    OptimizeLevel, ProviderCall, ProviderId, QualityTier, RelayError, RelayRequest, RelayResponse,
    ScopeTuple, TokenUsage,
};
use relay_cost::{choose_candidate, estimate_request, CostModel, OptimizeStrategy, TokenEstimate};
use relay_providers::{ProviderProfile, ProviderRegistry};
use relay_steering::SteeringEngine;
use relay_telemetry::Metrics;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Pipeline limits and defaults.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Global concurrency cap
    pub max_concurrency: u32,
    /// Deadline granted when the caller sets no max latency
    pub default_deadline: Duration,
    /// Latency reference for balanced optimization
    pub latency_reference: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 512,
            default_deadline: Duration::from_secs(60),
            latency_reference: Duration::from_millis(2000),
        }
    }
}

/// Per-request options parsed from transport headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestOptions {
    /// Cache participation
    pub cache: CacheControl,
    /// Optimization aggressiveness
    pub optimize: OptimizeLevel,
}

/// The assembled pipeline.
pub struct RequestPipeline {
    providers: Arc<ProviderRegistry>,
    steering: Arc<SteeringEngine>,
    budgets: Arc<BudgetTracker>,
    cost_model: CostModel,
    cache: Arc<ResponseCache>,
    outbox: UsageOutbox,
    metrics: Arc<Metrics>,
    admission: AdmissionControl,
    config: PipelineConfig,
}

impl RequestPipeline {
    /// Assemble a pipeline from its subsystems.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        providers: Arc<ProviderRegistry>,
        steering: Arc<SteeringEngine>,
        budgets: Arc<BudgetTracker>,
        cache: Arc<ResponseCache>,
        outbox: UsageOutbox,
        metrics: Arc<Metrics>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            cost_model: CostModel::new(Arc::clone(&providers)),
            admission: AdmissionControl::new(config.max_concurrency),
            providers,
            steering,
            budgets,
            cache,
            outbox,
            metrics,
            config,
        }
    }

    /// Handle one request end to end.
    ///
    /// # Errors
    /// Returns the taxonomy errors of §7: `InvalidRequest`, `Rejected`,
    /// `BudgetDenied`, `Overloaded`, `Cancelled`, `UnknownModel`,
    /// `NoEligibleModel`, `ProviderUnavailable`, and provider kinds.
    pub async fn handle(
        &self,
        request: RelayRequest,
        options: RequestOptions,
    ) -> Result<RelayResponse, RelayError> {
        let started = Instant::now();
        let result = self.execute(request, options).await;

        match &result {
            Ok(response) => {
                self.metrics.record_outcome("succeeded");
                self.metrics.record_cache(response.cache_status);
            }
            Err(error) => {
                self.metrics.record_outcome(error.code());
                match error {
                    RelayError::BudgetDenied { .. } => self.metrics.record_budget_denial(),
                    RelayError::Provider { provider, kind, .. } => self
                        .metrics
                        .record_provider_error(provider.as_str(), kind.as_str()),
                    _ => {}
                }
            }
        }
        self.metrics.observe_duration(started.elapsed().as_secs_f64());

        result
    }

    async fn execute(
        &self,
        request: RelayRequest,
        options: RequestOptions,
    ) -> Result<RelayResponse, RelayError> {
        // Phase: admitted
        request.validate()?;
        let correlation_id = request
            .correlation_id
            .clone()
            .unwrap_or_else(CorrelationId::generate);

        // Backpressure applies before any steering work
        let _permit = self.admission.admit()?;

        let deadline = Deadline::after(
            request
                .constraints
                .max_latency
                .unwrap_or(self.config.default_deadline),
        );
        if deadline.is_expired() {
            return Err(RelayError::Cancelled {
                elapsed: deadline.elapsed(),
            });
        }

        let estimate = estimate_request(&request);

        debug!(
            request_id = %request.request_id,
            correlation_id = %correlation_id,
            input_tokens = estimate.input_tokens,
            "Request admitted"
        );

        // Phase: steered
        let compiled = self.steering.snapshot();
        let steering = compiled.evaluate(&build_context(&request, &estimate))?;
        if let Some((status, message)) = steering.rejection {
            info!(
                request_id = %request.request_id,
                status,
                "Request rejected by steering rule"
            );
            return Err(RelayError::rejected(Some(status), message));
        }

        let capability = capability_for(request.metadata.task_type.as_deref());

        let steered_provider = steering
            .route
            .as_ref()
            .map(|route| ProviderId::new(route.provider.clone()));
        let steered_model = steering
            .route
            .as_ref()
            .and_then(|route| route.model.as_deref())
            .map(ModelId::new);

        // The caller's preferred model yields to an aggressive-optimize ask;
        // a steering route never does.
        let pinned_model = steered_model.or_else(|| {
            if options.optimize == OptimizeLevel::Aggressive {
                None
            } else {
                request.constraints.preferred_model.clone()
            }
        });
        let preferred_provider = steered_provider
            .or_else(|| request.constraints.preferred_provider.clone());

        let pool = self.candidate_pool(
            capability,
            preferred_provider.as_ref(),
            &estimate,
            request.constraints.max_cost,
        );

        // Steering transforms may have rewritten the quality requirement
        let quality = steered_quality(&steering.context).unwrap_or_else(|| request.quality_tier());
        let strategy = strategy_for(&options, quality, self.config.latency_reference);

        let provisional = match &pinned_model {
            Some(model) => {
                let profile = self.providers.enabled_profile(model)?;
                if !profile.supports(capability) {
                    return Err(RelayError::NoEligibleModel {
                        reason: format!("model '{model}' does not support {capability}"),
                    });
                }
                profile
            }
            None => choose_candidate(&pool, &estimate, strategy)?,
        };

        // Phase: budget-checked
        let scope = request.scope();
        let estimated_cost = CostModel::estimated_cost(&provisional, &estimate);
        let report = self
            .budgets
            .check_constraints(&scope, estimated_cost, &request.metadata.roles)
            .await
            .map_err(RelayError::from)?;

        let mut selected = provisional;
        let mut original_model = None;
        match report.decision {
            ConstraintDecision::Deny => {
                return Err(RelayError::budget_denied(report.reason, false));
            }
            ConstraintDecision::RequireApproval => {
                return Err(RelayError::budget_denied(report.reason, true));
            }
            ConstraintDecision::AllowWithDowngrade => {
                // Economy tier: rerun the optimizer for cost, ignoring the pin
                let cheapest = choose_candidate(&pool, &estimate, OptimizeStrategy::Aggressive)?;
                if cheapest.model != selected.model {
                    info!(
                        request_id = %request.request_id,
                        from = %selected.model,
                        to = %cheapest.model,
                        "Budget constraint downgraded model selection"
                    );
                    self.metrics.record_downgrade();
                    original_model = Some(selected.model.clone());
                    selected = cheapest;
                }
            }
            ConstraintDecision::Allow => {}
        }

        let estimated_cost = CostModel::estimated_cost(&selected, &estimate);
        let alternatives: Vec<ModelId> = pool
            .iter()
            .filter(|profile| profile.model != selected.model)
            .map(|profile| profile.model.clone())
            .collect();
        let reasoning = reasoning_for(&selected, original_model.as_ref(), strategy);

        // Phase: dispatched (via cache first)
        let messages = request.messages();
        let call = ProviderCall {
            model: selected.model.clone(),
            messages: messages.clone(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let bypass = request.constraints.stream || options.cache.is_bypass();
        let fingerprint = Fingerprint::compute(
            &messages,
            &selected.model,
            request.temperature,
            request.max_tokens,
        );

        let mut lease = None;
        if bypass {
            debug!(request_id = %request.request_id, "Cache bypassed");
        } else {
            match self.cache.admit(&fingerprint, deadline).await {
                CacheAdmission::Hit(hit) => {
                    debug!(request_id = %request.request_id, "Cache hit");
                    let impact = self
                        .record_usage(
                            &request,
                            &scope,
                            &hit.provider,
                            &hit.model,
                            hit.output.usage,
                            Decimal::ZERO,
                            &selected.currency,
                            original_model.as_ref(),
                            CacheStatus::Hit,
                        )
                        .await;

                    return Ok(RelayResponse {
                        request_id: request.request_id,
                        selected_model: hit.model.clone(),
                        selected_provider: hit.provider.clone(),
                        alternatives,
                        reasoning,
                        estimated_cost,
                        actual_cost: Decimal::ZERO,
                        currency: selected.currency.clone(),
                        budget_impact: impact,
                        fallback_chain: Vec::new(),
                        cache_status: CacheStatus::Hit,
                        output: hit.output,
                    });
                }
                CacheAdmission::Build(build_lease) => lease = build_lease,
            }
        }

        let DispatchSuccess {
            output,
            profile: served,
            attempted,
        } = dispatch_with_fallback(
            &self.providers,
            &self.admission,
            Arc::clone(&selected),
            &call,
            deadline,
        )
        .await?;

        // Actual cost from returned token counts, estimator values otherwise
        let usage = if output.usage.total() > 0 {
            output.usage
        } else {
            TokenUsage::new(estimate.input_tokens, estimate.estimated_output_tokens)
        };
        let actual_cost = served.cost(usage.input_tokens, usage.output_tokens);

        let cache_status = if bypass {
            CacheStatus::Bypass
        } else {
            CacheStatus::Miss
        };

        let impact = self
            .record_usage(
                &request,
                &scope,
                &served.provider,
                &served.model,
                usage,
                actual_cost,
                &served.currency,
                original_model.as_ref(),
                cache_status,
            )
            .await;

        if !bypass {
            let cached = CachedResponse {
                output: output.clone(),
                model: served.model.clone(),
                provider: served.provider.clone(),
                stored_at: chrono::Utc::now(),
            };
            self.cache
                .store(fingerprint, cached.clone(), options.cache.ttl_override);
            if let Some(lease) = lease {
                lease.complete(cached);
            }
        }

        info!(
            request_id = %request.request_id,
            model = %served.model,
            provider = %served.provider,
            estimated_cost = %estimated_cost,
            actual_cost = %actual_cost,
            "Request succeeded"
        );

        Ok(RelayResponse {
            request_id: request.request_id,
            selected_model: served.model.clone(),
            selected_provider: served.provider.clone(),
            alternatives,
            reasoning,
            estimated_cost,
            actual_cost,
            currency: served.currency.clone(),
            budget_impact: impact,
            fallback_chain: attempted,
            cache_status,
            output,
        })
    }

    /// Eligible candidates: enabled, capability-matched, healthy, within the
    /// provider preference and any max-cost constraint.
    fn candidate_pool(
        &self,
        capability: Capability,
        preferred_provider: Option<&ProviderId>,
        estimate: &TokenEstimate,
        max_cost: Option<Decimal>,
    ) -> Vec<Arc<ProviderProfile>> {
        self.providers
            .enabled_profiles(Some(capability))
            .into_iter()
            .filter(|profile| self.providers.is_healthy(&profile.model))
            .filter(|profile| {
                preferred_provider.map_or(true, |preferred| &profile.provider == preferred)
            })
            .filter(|profile| {
                max_cost.map_or(true, |cap| CostModel::estimated_cost(profile, estimate) <= cap)
            })
            .collect()
    }

    /// Bill the request against every applicable budget. Recording failures
    /// never fail the request; they drain through the outbox.
    #[allow(clippy::too_many_arguments)]
    async fn record_usage(
        &self,
        request: &RelayRequest,
        scope: &ScopeTuple,
        provider: &ProviderId,
        model: &ModelId,
        usage: TokenUsage,
        cost: Decimal,
        currency: &str,
        original_model: Option<&ModelId>,
        cache_status: CacheStatus,
    ) -> BudgetImpact {
        let budgets = match self.budgets.applicable_budgets(scope).await {
            Ok(budgets) => budgets,
            Err(error) => {
                warn!(
                    request_id = %request.request_id,
                    error = %error,
                    "Could not resolve applicable budgets; usage not recorded"
                );
                return BudgetImpact::default();
            }
        };

        let mut impact = BudgetImpact::default();
        for budget in budgets {
            let mut record = UsageRecord::new(
                budget.id.clone(),
                request.request_id.clone(),
                scope.clone(),
                provider.clone(),
                model.clone(),
                usage.input_tokens,
                usage.output_tokens,
                cost,
                currency,
            )
            .with_cache_status(cache_status);
            if let Some(original) = original_model {
                record = record.downgraded_from(original.clone());
            }

            match self.budgets.record_usage(record.clone()).await {
                Ok(status) => {
                    impact.status = impact.status.max(status.status);
                    impact.affected_budgets.push(budget.id);
                }
                Err(error) => {
                    warn!(
                        request_id = %request.request_id,
                        budget_id = %budget.id,
                        error = %error,
                        "Inline usage recording failed; queued to outbox"
                    );
                    self.outbox.enqueue(record);
                    impact.affected_budgets.push(budget.id);
                }
            }
        }

        impact
    }
}

fn steered_quality(context: &serde_json::Value) -> Option<QualityTier> {
    match context
        .pointer("/request/metadata/quality_requirement")?
        .as_str()?
    {
        "economy" => Some(QualityTier::Economy),
        "standard" => Some(QualityTier::Standard),
        "premium" => Some(QualityTier::Premium),
        _ => None,
    }
}

fn capability_for(task_type: Option<&str>) -> Capability {
    match task_type {
        Some("code-generation" | "code-review" | "code") => Capability::CodeGeneration,
        Some("reasoning" | "analysis" | "planning") => Capability::Reasoning,
        Some("vision" | "image-analysis") => Capability::Vision,
        Some("embeddings") => Capability::Embeddings,
        _ => Capability::TextGeneration,
    }
}

fn strategy_for(
    options: &RequestOptions,
    tier: QualityTier,
    latency_reference: Duration,
) -> OptimizeStrategy {
    match (options.optimize, tier) {
        (OptimizeLevel::Aggressive, _) => OptimizeStrategy::Aggressive,
        (_, QualityTier::Premium) => OptimizeStrategy::QualityFirst,
        _ => OptimizeStrategy::Balanced { latency_reference },
    }
}

fn reasoning_for(
    selected: &ProviderProfile,
    original_model: Option<&ModelId>,
    strategy: OptimizeStrategy,
) -> String {
    match original_model {
        Some(original) => format!(
            "downgraded from '{original}' to '{}' by budget constraint",
            selected.model
        ),
        None => match strategy {
            OptimizeStrategy::Aggressive => {
                format!("'{}' minimizes cost among eligible candidates", selected.model)
            }
            OptimizeStrategy::Balanced { .. } => format!(
                "'{}' offers the best cost/latency balance among eligible candidates",
                selected.model
            ),
            OptimizeStrategy::QualityFirst => format!(
                "'{}' is the cheapest model in the top quality tier",
                selected.model
            ),
        },
    }
}
