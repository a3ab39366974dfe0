//! # Relay Config
//!
//! Layered configuration: a YAML file, overridden by `RELAY_`-prefixed
//! environment variables, validated before startup completes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use relay_core::RelayError;
use relay_providers::ProviderProfile;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// Service identity
    #[serde(default)]
    pub service: ServiceConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Pipeline limits and defaults
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Response cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Budget subsystem configuration
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Steering rule file configuration
    #[serde(default)]
    pub steering: SteeringConfig,

    /// Upstream provider endpoints
    #[serde(default)]
    pub providers: Vec<ProviderEndpoint>,

    /// Model profiles loaded into the provider registry
    #[serde(default)]
    pub profiles: Vec<ProviderProfile>,
}

/// Service identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Service name for logs
    pub name: String,
    /// Deployment environment
    pub environment: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "relaycore".to_string(),
            environment: "development".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level filter
    pub level: String,
    /// Emit JSON-formatted records
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Pipeline limits and defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Global concurrency cap
    pub max_concurrency: u32,
    /// Deadline granted when the caller sets no max latency
    #[serde(with = "humantime_serde")]
    pub default_deadline: Duration,
    /// Latency that counts as a 2x cost penalty in balanced optimization
    #[serde(with = "humantime_serde")]
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

/// Response cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Whether the response cache participates
    pub enabled: bool,
    /// Default entry TTL
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,
    /// Upper bound on stored entries
    pub max_entries: usize,
    /// Cap on single-flight waits
    #[serde(with = "humantime_serde")]
    pub max_flight_wait: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl: Duration::from_secs(3600),
            max_entries: 10_000,
            max_flight_wait: Duration::from_secs(10),
        }
    }
}

/// Budget subsystem configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetConfig {
    /// Status cache freshness window
    #[serde(with = "humantime_serde")]
    pub status_freshness: Duration,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            status_freshness: Duration::from_secs(300),
        }
    }
}

/// Steering rule file configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SteeringConfig {
    /// Path to the YAML rule file; absent means an empty rule set
    #[serde(default)]
    pub rules_file: Option<String>,
    /// Reload the rule file on change
    #[serde(default)]
    pub watch: bool,
}

/// Kinds of provider endpoints the gateway can front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI chat completions
    Openai,
    /// Anthropic messages
    Anthropic,
    /// The internal specialist service
    Specialist,
}

/// One upstream endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderEndpoint {
    /// Provider instance id, referenced by profiles
    pub id: String,
    /// Which adapter fronts it
    pub kind: ProviderKind,
    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<String>,
    /// Disabled endpoints are not registered
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl RelayConfig {
    /// Parse configuration from YAML text.
    ///
    /// # Errors
    /// Returns `Configuration` when the text does not parse.
    pub fn from_yaml(yaml: &str) -> Result<Self, RelayError> {
        serde_yaml::from_str(yaml)
            .map_err(|e| RelayError::configuration(format!("config does not parse: {e}")))
    }

    /// Load configuration from a file, then apply environment overrides.
    ///
    /// # Errors
    /// Returns `Configuration` when the file is unreadable or invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, RelayError> {
        let mut config = match path {
            Some(path) => {
                let yaml = std::fs::read_to_string(path).map_err(|e| {
                    RelayError::configuration(format!(
                        "cannot read config file '{}': {e}",
                        path.display()
                    ))
                })?;
                info!(path = %path.display(), "Configuration loaded from file");
                Self::from_yaml(&yaml)?
            }
            None => Self::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `RELAY_`-prefixed environment overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("RELAY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(value) = std::env::var("RELAY_MAX_CONCURRENCY") {
            if let Ok(parsed) = value.parse() {
                self.pipeline.max_concurrency = parsed;
            }
        }
        if let Ok(path) = std::env::var("RELAY_RULES_FILE") {
            self.steering.rules_file = Some(path);
        }
        if let Ok(value) = std::env::var("RELAY_CACHE_ENABLED") {
            self.cache.enabled = value != "false" && value != "0";
        }
    }

    /// Validate cross-field invariants.
    ///
    /// # Errors
    /// Returns `Configuration` on inconsistency.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.pipeline.max_concurrency == 0 {
            return Err(RelayError::configuration(
                "pipeline.max_concurrency must be positive",
            ));
        }

        for profile in &self.profiles {
            profile.validate()?;
            if profile.enabled
                && !self
                    .providers
                    .iter()
                    .any(|endpoint| endpoint.enabled && endpoint.id == profile.provider.as_str())
            {
                return Err(RelayError::configuration(format!(
                    "profile '{}' references provider '{}' with no enabled endpoint",
                    profile.model, profile.provider
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
service:
  name: relaycore
  environment: staging
logging:
  level: debug
  json: true
pipeline:
  max_concurrency: 128
  default_deadline: 30s
  latency_reference: 2s
cache:
  enabled: true
  default_ttl: 1h
  max_entries: 5000
  max_flight_wait: 5s
budget:
  status_freshness: 5m
steering:
  rules_file: rules.yaml
  watch: true
providers:
  - id: openai
    kind: openai
    api_key_env: OPENAI_API_KEY
profiles:
  - provider: openai
    model: gpt-4-turbo
    capabilities: [text-generation, reasoning]
    input_cost_per_token: 0.00001
    output_cost_per_token: 0.00003
    currency: USD
    advertised_latency: 2500ms
    max_concurrency: 100
    enabled: true
    quality_tier: premium
    fallback_models: [gpt-3.5-turbo]
  - provider: openai
    model: gpt-3.5-turbo
    capabilities: [text-generation]
    input_cost_per_token: 0.0000015
    output_cost_per_token: 0.000002
    currency: USD
    advertised_latency: 800ms
    max_concurrency: 200
    enabled: true
    quality_tier: economy
"#;

    #[test]
    fn test_parse_sample() {
        let config = RelayConfig::from_yaml(SAMPLE).expect("parse");
        assert_eq!(config.service.environment, "staging");
        assert_eq!(config.pipeline.max_concurrency, 128);
        assert_eq!(config.pipeline.default_deadline, Duration::from_secs(30));
        assert_eq!(config.profiles.len(), 2);
        assert_eq!(config.profiles[0].fallback_models.len(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_validate() {
        let config = RelayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.max_concurrency, 512);
    }

    #[test]
    fn test_orphan_profile_rejected() {
        let yaml = r#"
profiles:
  - provider: nowhere
    model: m1
    capabilities: [text-generation]
    input_cost_per_token: 0.1
    output_cost_per_token: 0.1
    currency: USD
    advertised_latency: 1s
    max_concurrency: 10
    enabled: true
"#;
        let config = RelayConfig::from_yaml(yaml).expect("parse");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = RelayConfig::from_yaml("bogus_field: 1");
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = RelayConfig::from_yaml("pipeline:\n  max_concurrency: 0\n  default_deadline: 30s\n  latency_reference: 2s")
            .expect("parse");
        assert!(config.validate().is_err());
    }
}
