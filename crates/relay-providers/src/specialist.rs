//! Internal specialist service adapter.
//!
//! The specialist service is an in-house model host with a plain JSON
//! contract: `POST /v1/generate` with the chat transcript, answering with
//! content and exact token counts.

use async_trait::async_trait;
use parking_lot::RwLock;
use relay_core::{
    AdapterHealth, Capability, Deadline, FinishReason, ModelOutput, ProviderAdapter, ProviderCall,
    ProviderErrorKind, ProviderId, RelayError, TokenUsage,
};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Specialist adapter configuration.
#[derive(Debug, Clone)]
pub struct SpecialistConfig {
    /// Provider instance ID
    pub id: String,
    /// Service base URL
    pub base_url: String,
    /// Optional bearer token for service-to-service auth
    pub auth_token: Option<SecretString>,
    /// Capabilities this deployment serves
    pub capabilities: Vec<Capability>,
    /// Request timeout
    pub timeout: Duration,
}

impl SpecialistConfig {
    /// Create a configuration pointing at a deployment.
    #[must_use]
    pub fn new(id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.into(),
            auth_token: None,
            capabilities: vec![Capability::TextGeneration, Capability::CodeGeneration],
            timeout: Duration::from_secs(60),
        }
    }

    /// Set the bearer token.
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(SecretString::new(token.into()));
        self
    }

    /// Set the capabilities this deployment serves.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Vec<Capability>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Override the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Adapter for the internal specialist service.
pub struct SpecialistProvider {
    id: ProviderId,
    config: SpecialistConfig,
    client: Client,
    state: RwLock<AdapterHealth>,
}

impl SpecialistProvider {
    /// Create a new adapter.
    ///
    /// # Errors
    /// Returns `Configuration` if the HTTP client cannot be created.
    pub fn new(config: SpecialistConfig) -> Result<Self, RelayError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                RelayError::configuration(format!("failed to create HTTP client: {e}"))
            })?;

        Ok(Self {
            id: ProviderId::new(config.id.clone()),
            config,
            client,
            state: RwLock::new(AdapterHealth::healthy()),
        })
    }
}

#[async_trait]
impl ProviderAdapter for SpecialistProvider {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    async fn call(
        &self,
        request: &ProviderCall,
        deadline: Deadline,
    ) -> Result<ModelOutput, RelayError> {
        if deadline.is_expired() {
            return Err(RelayError::Cancelled {
                elapsed: deadline.elapsed(),
            });
        }

        let started = Instant::now();
        let budget = deadline.remaining_capped(self.config.timeout);

        let wire = GenerateRequest {
            model: request.model.as_str().to_string(),
            messages: request
                .messages
                .iter()
                .map(|m| GenerateMessage {
                    role: m.role.to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        debug!(
            provider = %self.id,
            model = %request.model,
            budget_ms = budget.as_millis(),
            "Dispatching specialist generate"
        );

        let mut builder = self
            .client
            .post(format!("{}/v1/generate", self.config.base_url))
            .json(&wire);
        if let Some(ref token) = self.config.auth_token {
            builder = builder.bearer_auth(token.expose_secret());
        }

        let result = match tokio::time::timeout(budget, builder.send()).await {
            Err(_) => Err(RelayError::provider(
                self.id.clone(),
                ProviderErrorKind::Timeout,
                format!("no response within {budget:?}"),
                None,
            )),
            Ok(Err(e)) if e.is_timeout() => Err(RelayError::provider(
                self.id.clone(),
                ProviderErrorKind::Timeout,
                e.to_string(),
                None,
            )),
            Ok(Err(e)) => Err(RelayError::provider(
                self.id.clone(),
                ProviderErrorKind::Retryable,
                e.to_string(),
                None,
            )),
            Ok(Ok(response)) => {
                let status = response.status().as_u16();
                if status >= 400 {
                    let body = response.text().await.unwrap_or_default();
                    let kind = match status {
                        429 => ProviderErrorKind::Quota,
                        s if s >= 500 => ProviderErrorKind::Retryable,
                        _ => ProviderErrorKind::Fatal,
                    };
                    Err(RelayError::provider(
                        self.id.clone(),
                        kind,
                        body,
                        Some(status),
                    ))
                } else {
                    response
                        .json::<GenerateResponse>()
                        .await
                        .map_err(|e| {
                            RelayError::provider(
                                self.id.clone(),
                                ProviderErrorKind::Fatal,
                                format!("malformed response body: {e}"),
                                Some(status),
                            )
                        })
                        .map(|body| ModelOutput {
                            content: body.content,
                            usage: TokenUsage::new(body.input_tokens, body.output_tokens),
                            finish_reason: FinishReason::Stop,
                            model_used: body.model,
                        })
                }
            }
        };

        {
            let mut state = self.state.write();
            match &result {
                Ok(_) => *state = AdapterHealth::healthy().with_latency(started.elapsed()),
                Err(error) => *state = AdapterHealth::unhealthy(error.to_string()),
            }
        }

        if let Err(ref error) = result {
            warn!(provider = %self.id, model = %request.model, error = %error, "Specialist call failed");
        }

        result
    }

    async fn health(&self) -> AdapterHealth {
        self.state.read().clone()
    }

    fn supports(&self, capability: Capability) -> bool {
        self.config.capabilities.contains(&capability)
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    messages: Vec<GenerateMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct GenerateMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    content: String,
    model: String,
    input_tokens: u32,
    output_tokens: u32,
}
