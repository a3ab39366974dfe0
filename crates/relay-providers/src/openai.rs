//! OpenAI provider adapter.
//!
//! Translates normalized calls to the OpenAI chat completions API and
//! classifies upstream failures into the provider error kinds.

use async_trait::async_trait;
use parking_lot::RwLock;
use relay_core::{
    AdapterHealth, Capability, Deadline, FinishReason, MessageRole, ModelOutput, ProviderAdapter,
    ProviderCall, ProviderErrorKind, ProviderId, RelayError, TokenUsage,
};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// OpenAI adapter configuration.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Provider instance ID
    pub id: String,
    /// API key
    pub api_key: SecretString,
    /// Base URL (override for proxies and tests)
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
}

impl OpenAiConfig {
    /// Create a configuration with the production endpoint.
    #[must_use]
    pub fn new(id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            api_key: SecretString::new(api_key.into()),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: Duration::from_secs(120),
        }
    }

    /// Override the base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// OpenAI chat completions adapter.
pub struct OpenAiProvider {
    id: ProviderId,
    config: OpenAiConfig,
    client: Client,
    state: RwLock<AdapterHealth>,
}

impl OpenAiProvider {
    /// Create a new adapter.
    ///
    /// # Errors
    /// Returns `Configuration` if the HTTP client cannot be created.
    pub fn new(config: OpenAiConfig) -> Result<Self, RelayError> {
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

    fn transform_request(&self, request: &ProviderCall) -> OpenAiRequest {
        let messages = request
            .messages
            .iter()
            .map(|message| OpenAiMessage {
                role: role_str(message.role).to_string(),
                content: message.content.clone(),
                name: message.name.clone(),
            })
            .collect();

        OpenAiRequest {
            model: request.model.as_str().to_string(),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }

    fn classify(&self, status: u16, body: &str) -> RelayError {
        let kind = match status {
            429 => ProviderErrorKind::Quota,
            408 => ProviderErrorKind::Timeout,
            400 if body.contains("content_policy") => ProviderErrorKind::PolicyViolation,
            s if s >= 500 => ProviderErrorKind::Retryable,
            _ => ProviderErrorKind::Fatal,
        };
        RelayError::provider(self.id.clone(), kind, truncate(body), Some(status))
    }

    fn record_outcome(&self, result: &Result<ModelOutput, RelayError>, latency: Duration) {
        let mut state = self.state.write();
        match result {
            Ok(_) => *state = AdapterHealth::healthy().with_latency(latency),
            Err(error) => *state = AdapterHealth::unhealthy(error.to_string()),
        }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiProvider {
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
        let wire = self.transform_request(request);
        let budget = deadline.remaining_capped(self.config.timeout);

        debug!(
            provider = %self.id,
            model = %request.model,
            budget_ms = budget.as_millis(),
            "Dispatching OpenAI chat completion"
        );

        let send = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&wire)
            .send();

        let result = match tokio::time::timeout(budget, send).await {
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
                    Err(self.classify(status, &body))
                } else {
                    response
                        .json::<OpenAiResponse>()
                        .await
                        .map_err(|e| {
                            RelayError::provider(
                                self.id.clone(),
                                ProviderErrorKind::Fatal,
                                format!("malformed response body: {e}"),
                                Some(status),
                            )
                        })
                        .and_then(|body| body.into_output(&self.id))
                }
            }
        };

        self.record_outcome(&result, started.elapsed());

        if let Err(ref error) = result {
            warn!(provider = %self.id, model = %request.model, error = %error, "OpenAI call failed");
        }

        result
    }

    async fn health(&self) -> AdapterHealth {
        self.state.read().clone()
    }

    fn supports(&self, capability: Capability) -> bool {
        matches!(
            capability,
            Capability::TextGeneration
                | Capability::CodeGeneration
                | Capability::Reasoning
                | Capability::Vision
        )
    }
}

fn role_str(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    }
}

fn truncate(body: &str) -> String {
    const MAX_CHARS: usize = 512;
    match body.char_indices().nth(MAX_CHARS) {
        Some((boundary, _)) => format!("{}…", &body[..boundary]),
        None => body.to_string(),
    }
}

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    model: String,
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl OpenAiResponse {
    fn into_output(mut self, provider: &ProviderId) -> Result<ModelOutput, RelayError> {
        if self.choices.is_empty() {
            return Err(RelayError::provider(
                provider.clone(),
                ProviderErrorKind::Fatal,
                "response contained no choices",
                None,
            ));
        }
        let choice = self.choices.remove(0);

        let finish_reason = match choice.finish_reason.as_deref() {
            Some("stop") | None => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("tool_calls") => FinishReason::ToolUse,
            Some("content_filter") => FinishReason::ContentFilter,
            Some(_) => FinishReason::Other,
        };

        let usage = self
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        Ok(ModelOutput {
            content: choice.message.content.unwrap_or_default(),
            usage,
            finish_reason,
            model_used: self.model,
        })
    }
}
