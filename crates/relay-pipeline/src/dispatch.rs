//! Provider dispatch with fallback.
//!
//! Walks the chosen model's fallback chain in order. Retryable failures get
//! one retry with backoff capped by the deadline; unhealthy models are
//! skipped without a call; fatal, quota, and policy failures advance the
//! chain. No usage is recorded for failed calls.

use crate::admission::AdmissionControl;
use relay_core::{
    Deadline, ModelId, ModelOutput, ProviderCall, RelayError,
};
use relay_providers::{ProviderProfile, ProviderRegistry};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// The result of a successful dispatch.
#[derive(Debug)]
pub struct DispatchSuccess {
    /// The normalized output
    pub output: ModelOutput,
    /// The profile that served the request
    pub profile: Arc<ProviderProfile>,
    /// Models actually attempted, in order
    pub attempted: Vec<ModelId>,
}

/// Dispatch a call, walking the fallback chain until success or exhaustion.
///
/// # Errors
/// Returns `Cancelled` when the deadline expires, `Overloaded` when a
/// provider cap rejects the only remaining candidate, and
/// `ProviderUnavailable` when the chain is exhausted.
pub async fn dispatch_with_fallback(
    registry: &ProviderRegistry,
    admission: &AdmissionControl,
    chosen: Arc<ProviderProfile>,
    call: &ProviderCall,
    deadline: Deadline,
) -> Result<DispatchSuccess, RelayError> {
    let mut chain: Vec<ModelId> = Vec::with_capacity(1 + chosen.fallback_models.len());
    chain.push(chosen.model.clone());
    chain.extend(chosen.fallback_models.iter().cloned());

    let mut attempted = Vec::new();
    let mut last_overload: Option<RelayError> = None;

    for model in &chain {
        if deadline.is_expired() {
            return Err(RelayError::Cancelled {
                elapsed: deadline.elapsed(),
            });
        }

        let Ok(profile) = registry.enabled_profile(model) else {
            debug!(model = %model, "Fallback candidate has no enabled profile, skipping");
            continue;
        };

        if !registry.is_healthy(model) {
            debug!(model = %model, "Candidate unhealthy, advancing fallback chain");
            continue;
        }

        let Some(adapter) = registry.adapter(&profile.provider) else {
            warn!(
                model = %model,
                provider = %profile.provider,
                "No adapter for candidate's provider, skipping"
            );
            continue;
        };

        let permit = match admission.provider_permit(&profile.provider, profile.max_concurrency) {
            Ok(permit) => permit,
            Err(overloaded) => {
                last_overload = Some(overloaded);
                continue;
            }
        };

        let targeted = ProviderCall {
            model: model.clone(),
            ..call.clone()
        };

        attempted.push(model.clone());

        let mut result = adapter.call(&targeted, deadline).await;

        // Retryable errors get exactly one retry, backoff capped by the deadline
        if matches!(&result, Err(e) if e.is_retryable()) && !deadline.is_expired() {
            let backoff = deadline.remaining_capped(RETRY_BASE_DELAY);
            debug!(model = %model, backoff_ms = backoff.as_millis(), "Retrying after retryable error");
            tokio::time::sleep(backoff).await;
            result = adapter.call(&targeted, deadline).await;
        }

        drop(permit);

        match result {
            Ok(output) => {
                registry.record_success(model);
                return Ok(DispatchSuccess {
                    output,
                    profile,
                    attempted,
                });
            }
            Err(error @ RelayError::Cancelled { .. }) => return Err(error),
            Err(error) => {
                registry.record_failure(model, error.to_string());
                warn!(
                    model = %model,
                    error = %error,
                    "Candidate failed, advancing fallback chain"
                );
            }
        }
    }

    if attempted.is_empty() {
        if let Some(overloaded) = last_overload {
            return Err(overloaded);
        }
    }

    Err(RelayError::ProviderUnavailable {
        model: chosen.model.clone(),
        attempted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use relay_core::{
        AdapterHealth, Capability, ChatMessage, FinishReason, ProviderAdapter, ProviderErrorKind,
        ProviderId, TokenUsage,
    };
    use std::collections::HashMap;

    /// Scripted adapter: each model answers from a fixed script.
    struct ScriptedAdapter {
        id: ProviderId,
        script: Mutex<HashMap<String, Vec<Result<String, ProviderErrorKind>>>>,
    }

    impl ScriptedAdapter {
        fn new(id: &str, script: HashMap<String, Vec<Result<String, ProviderErrorKind>>>) -> Self {
            Self {
                id: ProviderId::new(id),
                script: Mutex::new(script),
            }
        }
    }

    #[async_trait]
    impl ProviderAdapter for ScriptedAdapter {
        fn id(&self) -> &ProviderId {
            &self.id
        }

        async fn call(
            &self,
            request: &ProviderCall,
            _deadline: Deadline,
        ) -> Result<ModelOutput, RelayError> {
            let mut script = self.script.lock();
            let steps = script
                .get_mut(request.model.as_str())
                .unwrap_or_else(|| panic!("no script for {}", request.model));
            match steps.remove(0) {
                Ok(content) => Ok(ModelOutput {
                    content,
                    usage: TokenUsage::new(10, 5),
                    finish_reason: FinishReason::Stop,
                    model_used: request.model.as_str().to_string(),
                }),
                Err(kind) => Err(RelayError::provider(
                    self.id.clone(),
                    kind,
                    "scripted failure",
                    None,
                )),
            }
        }

        async fn health(&self) -> AdapterHealth {
            AdapterHealth::healthy()
        }

        fn supports(&self, _capability: Capability) -> bool {
            true
        }
    }

    fn call() -> ProviderCall {
        ProviderCall::new(ModelId::new("gpt-4-turbo"), vec![ChatMessage::user("hi")])
    }

    fn registry_with(
        script: HashMap<String, Vec<Result<String, ProviderErrorKind>>>,
    ) -> ProviderRegistry {
        let registry = ProviderRegistry::new();
        registry.register_adapter(Arc::new(ScriptedAdapter::new("openai", script)));
        registry
            .load_profiles(vec![
                ProviderProfile::new("openai", "gpt-4-turbo").with_fallbacks(vec![
                    ModelId::new("gpt-3.5-turbo"),
                    ModelId::new("claude-3-sonnet"),
                ]),
                ProviderProfile::new("openai", "gpt-3.5-turbo"),
                ProviderProfile::new("openai", "claude-3-sonnet"),
            ])
            .expect("load");
        registry
    }

    #[tokio::test]
    async fn test_primary_succeeds() {
        let registry = registry_with(HashMap::from([(
            "gpt-4-turbo".to_string(),
            vec![Ok("answer".to_string())],
        )]));
        let admission = AdmissionControl::new(10);
        let chosen = registry
            .enabled_profile(&ModelId::new("gpt-4-turbo"))
            .expect("profile");

        let success = dispatch_with_fallback(
            &registry,
            &admission,
            chosen,
            &call(),
            Deadline::after(Duration::from_secs(5)),
        )
        .await
        .expect("dispatch");

        assert_eq!(success.output.content, "answer");
        assert_eq!(success.attempted, vec![ModelId::new("gpt-4-turbo")]);
    }

    #[tokio::test]
    async fn test_unhealthy_primary_skipped_fallback_answers() {
        let registry = registry_with(HashMap::from([(
            "gpt-3.5-turbo".to_string(),
            vec![Ok("fallback answer".to_string())],
        )]));
        registry.set_health(&ModelId::new("gpt-4-turbo"), false);

        let admission = AdmissionControl::new(10);
        let chosen = registry
            .enabled_profile(&ModelId::new("gpt-4-turbo"))
            .expect("profile");

        let success = dispatch_with_fallback(
            &registry,
            &admission,
            chosen,
            &call(),
            Deadline::after(Duration::from_secs(5)),
        )
        .await
        .expect("dispatch");

        assert_eq!(success.output.content, "fallback answer");
        assert_eq!(success.profile.model.as_str(), "gpt-3.5-turbo");
        // Only the model actually called lands in the attempted chain
        assert_eq!(success.attempted, vec![ModelId::new("gpt-3.5-turbo")]);
    }

    #[tokio::test]
    async fn test_fatal_error_advances_chain_in_order() {
        let registry = registry_with(HashMap::from([
            (
                "gpt-4-turbo".to_string(),
                vec![Err(ProviderErrorKind::Fatal)],
            ),
            (
                "gpt-3.5-turbo".to_string(),
                vec![Err(ProviderErrorKind::Quota)],
            ),
            (
                "claude-3-sonnet".to_string(),
                vec![Ok("third time lucky".to_string())],
            ),
        ]));
        let admission = AdmissionControl::new(10);
        let chosen = registry
            .enabled_profile(&ModelId::new("gpt-4-turbo"))
            .expect("profile");

        let success = dispatch_with_fallback(
            &registry,
            &admission,
            chosen,
            &call(),
            Deadline::after(Duration::from_secs(5)),
        )
        .await
        .expect("dispatch");

        assert_eq!(success.output.content, "third time lucky");
        assert_eq!(
            success.attempted,
            vec![
                ModelId::new("gpt-4-turbo"),
                ModelId::new("gpt-3.5-turbo"),
                ModelId::new("claude-3-sonnet"),
            ]
        );
    }

    #[tokio::test]
    async fn test_retryable_error_retried_once_then_succeeds() {
        let registry = registry_with(HashMap::from([(
            "gpt-4-turbo".to_string(),
            vec![Err(ProviderErrorKind::Retryable), Ok("recovered".to_string())],
        )]));
        let admission = AdmissionControl::new(10);
        let chosen = registry
            .enabled_profile(&ModelId::new("gpt-4-turbo"))
            .expect("profile");

        let success = dispatch_with_fallback(
            &registry,
            &admission,
            chosen,
            &call(),
            Deadline::after(Duration::from_secs(5)),
        )
        .await
        .expect("dispatch");

        assert_eq!(success.output.content, "recovered");
        // One attempt entry even though the adapter was called twice
        assert_eq!(success.attempted.len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_chain_is_provider_unavailable() {
        let registry = registry_with(HashMap::from([
            (
                "gpt-4-turbo".to_string(),
                vec![Err(ProviderErrorKind::Fatal)],
            ),
            (
                "gpt-3.5-turbo".to_string(),
                vec![Err(ProviderErrorKind::Fatal)],
            ),
            (
                "claude-3-sonnet".to_string(),
                vec![Err(ProviderErrorKind::Fatal)],
            ),
        ]));
        let admission = AdmissionControl::new(10);
        let chosen = registry
            .enabled_profile(&ModelId::new("gpt-4-turbo"))
            .expect("profile");

        let error = dispatch_with_fallback(
            &registry,
            &admission,
            chosen,
            &call(),
            Deadline::after(Duration::from_secs(5)),
        )
        .await
        .expect_err("should exhaust");

        match error {
            RelayError::ProviderUnavailable { attempted, .. } => {
                assert_eq!(attempted.len(), 3);
            }
            other => panic!("expected ProviderUnavailable, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_expired_deadline_cancels() {
        let registry = registry_with(HashMap::new());
        let admission = AdmissionControl::new(10);
        let chosen = registry
            .enabled_profile(&ModelId::new("gpt-4-turbo"))
            .expect("profile");

        let error = dispatch_with_fallback(
            &registry,
            &admission,
            chosen,
            &call(),
            Deadline::after(Duration::ZERO),
        )
        .await
        .expect_err("should cancel");

        assert!(matches!(error, RelayError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_repeated_failures_mark_unhealthy() {
        let registry = registry_with(HashMap::from([
            (
                "gpt-4-turbo".to_string(),
                vec![
                    Err(ProviderErrorKind::Fatal),
                    Err(ProviderErrorKind::Fatal),
                    Err(ProviderErrorKind::Fatal),
                ],
            ),
            (
                "gpt-3.5-turbo".to_string(),
                vec![
                    Ok("ok".to_string()),
                    Ok("ok".to_string()),
                    Ok("ok".to_string()),
                ],
            ),
        ]));
        let admission = AdmissionControl::new(10);

        for _ in 0..3 {
            let chosen = registry
                .enabled_profile(&ModelId::new("gpt-4-turbo"))
                .expect("profile");
            dispatch_with_fallback(
                &registry,
                &admission,
                chosen,
                &call(),
                Deadline::after(Duration::from_secs(5)),
            )
            .await
            .expect("dispatch");
        }

        assert!(!registry.is_healthy(&ModelId::new("gpt-4-turbo")));
    }
}
