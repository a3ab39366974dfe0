//! # RelayCore
//!
//! AI request routing and cost-governance gateway.
//!
//! ## Features
//!
//! - Declarative steering rules with hot reload
//! - Hierarchical multi-scope budgets with real-time constraint checks
//! - Cost-based model selection across providers
//! - Response caching with single-flight de-duplication
//! - Provider fallback chains with health tracking
//!
//! ## Usage
//!
//! ```bash
//! # Start with default configuration
//! relaycore
//!
//! # Start with a config file
//! relaycore --config /path/to/relay.yaml
//!
//! # Start with environment overrides
//! RELAY_LOG_LEVEL=debug relaycore
//! ```
//!
//! The HTTP transport is an external collaborator: it mounts on the
//! assembled [`relay_pipeline::RequestPipeline`].

use relay_budget::{BudgetRegistry, BudgetTracker, InMemoryBudgetStore, UsageOutbox};
use relay_cache::{ResponseCache, ResponseCacheConfig};
use relay_config::{ProviderKind, RelayConfig};
use relay_pipeline::{PipelineConfig, RequestPipeline};
use relay_providers::{
    AnthropicConfig, AnthropicProvider, OpenAiConfig, OpenAiProvider, ProviderRegistry,
    SpecialistConfig, SpecialistProvider,
};
use relay_steering::{RuleFileWatcher, SteeringEngine};
use relay_telemetry::{init_logging, LoggingConfig, Metrics};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Application entry point
#[tokio::main]
async fn main() {
    let config_path = parse_args();

    // A first-pass subscriber so configuration problems are visible
    if let Err(e) = init_logging(&LoggingConfig::new()) {
        eprintln!("Failed to initialize logging: {e}");
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting RelayCore"
    );

    if let Err(e) = run(config_path).await {
        error!(error = %e, "Fatal startup failure");
        std::process::exit(1);
    }
}

/// Main application logic
async fn run(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = RelayConfig::load(config_path.as_deref())?;

    info!(
        environment = %config.service.environment,
        max_concurrency = config.pipeline.max_concurrency,
        "Configuration loaded"
    );

    let metrics = Arc::new(Metrics::new()?);

    // Providers
    let providers = Arc::new(create_provider_registry(&config)?);
    providers.load_profiles(config.profiles.clone())?;
    info!(
        adapters = providers.adapter_count(),
        models = config.profiles.len(),
        "Provider registry initialized"
    );

    // Steering
    let steering = Arc::new(match config.steering.rules_file.as_deref() {
        Some(path) => SteeringEngine::from_path(path)?,
        None => SteeringEngine::from_yaml(EMPTY_RULE_SET)?,
    });
    let _watcher = match (&config.steering.rules_file, config.steering.watch) {
        (Some(path), true) => Some(RuleFileWatcher::spawn(Arc::clone(&steering), path.clone())?),
        _ => None,
    };

    // Budgets
    let store = Arc::new(InMemoryBudgetStore::new());
    let _budget_registry = BudgetRegistry::new(store.clone());
    let tracker = Arc::new(BudgetTracker::with_freshness(
        store,
        config.budget.status_freshness,
    ));
    let (outbox, outbox_worker) = UsageOutbox::spawn(Arc::clone(&tracker));

    // Response cache
    let cache = Arc::new(ResponseCache::new(ResponseCacheConfig {
        enabled: config.cache.enabled,
        default_ttl: config.cache.default_ttl,
        max_entries: config.cache.max_entries,
        max_flight_wait: config.cache.max_flight_wait,
    }));

    // Pipeline
    let pipeline = Arc::new(RequestPipeline::new(
        providers,
        steering,
        Arc::clone(&tracker),
        cache,
        outbox.clone(),
        metrics,
        PipelineConfig {
            max_concurrency: config.pipeline.max_concurrency,
            default_deadline: config.pipeline.default_deadline,
            latency_reference: config.pipeline.latency_reference,
        },
    ));

    info!("RelayCore ready; transport can attach to the pipeline");

    // Wait for shutdown
    shutdown_signal().await;
    info!("Shutdown signal received, draining outbox");

    // Closing the last outbox handle lets the worker drain and exit
    drop(pipeline);
    drop(outbox);
    if let Err(e) = outbox_worker.await {
        warn!(error = %e, "Outbox worker did not exit cleanly");
    }

    info!("Shutdown complete");
    Ok(())
}

const EMPTY_RULE_SET: &str = r#"
version: "1"
name: empty
rules: []
"#;

/// Create the provider registry from configuration
fn create_provider_registry(config: &RelayConfig) -> anyhow::Result<ProviderRegistry> {
    let registry = ProviderRegistry::new();

    for endpoint in &config.providers {
        if !endpoint.enabled {
            continue;
        }

        let api_key = endpoint
            .api_key_env
            .as_ref()
            .and_then(|var| std::env::var(var).ok());

        match endpoint.kind {
            ProviderKind::Openai => {
                let Some(api_key) = api_key else {
                    warn!(provider = %endpoint.id, "No API key available, skipping");
                    continue;
                };
                let mut adapter_config = OpenAiConfig::new(&endpoint.id, api_key);
                if let Some(ref base_url) = endpoint.base_url {
                    adapter_config = adapter_config.with_base_url(base_url);
                }
                registry.register_adapter(Arc::new(OpenAiProvider::new(adapter_config)?));
            }
            ProviderKind::Anthropic => {
                let Some(api_key) = api_key else {
                    warn!(provider = %endpoint.id, "No API key available, skipping");
                    continue;
                };
                let mut adapter_config = AnthropicConfig::new(&endpoint.id, api_key);
                if let Some(ref base_url) = endpoint.base_url {
                    adapter_config = adapter_config.with_base_url(base_url);
                }
                registry.register_adapter(Arc::new(AnthropicProvider::new(adapter_config)?));
            }
            ProviderKind::Specialist => {
                let Some(ref base_url) = endpoint.base_url else {
                    warn!(provider = %endpoint.id, "Specialist endpoint needs a base_url, skipping");
                    continue;
                };
                let mut adapter_config = SpecialistConfig::new(&endpoint.id, base_url);
                if let Some(token) = api_key {
                    adapter_config = adapter_config.with_auth_token(token);
                }
                registry.register_adapter(Arc::new(SpecialistProvider::new(adapter_config)?));
            }
        }

        info!(provider = %endpoint.id, kind = ?endpoint.kind, "Provider adapter registered");
    }

    Ok(registry)
}

fn parse_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" || arg == "-c" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_rule_set_compiles() {
        assert!(SteeringEngine::from_yaml(EMPTY_RULE_SET).is_ok());
    }
}
