//! Anthropic provider adapter.
//!
//! Translates normalized calls to the Anthropic messages API. System
//! messages are lifted into the top-level `system` field; the API requires
//! an explicit `max_tokens`, so a default is applied when the caller set
//! none.

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

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Anthropic adapter configuration.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// Provider instance ID
    pub id: String,
    /// API key
    pub api_key: SecretString,
    /// Base URL (override for proxies and tests)
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
}

impl AnthropicConfig {
    /// Create a configuration with the production endpoint.
    #[must_use]
    pub fn new(id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            api_key: SecretString::new(api_key.into()),
            base_url: "https://api.anthropic.com".to_string(),
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

/// Anthropic messages adapter.
pub struct AnthropicProvider {
    id: ProviderId,
    config: AnthropicConfig,
    client: Client,
    state: RwLock<AdapterHealth>,
}

impl AnthropicProvider {
    /// Create a new adapter.
    ///
    /// # Errors
    /// Returns `Configuration` if the HTTP client cannot be created.
    pub fn new(config: AnthropicConfig) -> Result<Self, RelayError> {
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

    fn transform_request(&self, request: &ProviderCall) -> AnthropicRequest {
        let mut system = Vec::new();
        let mut messages = Vec::new();

        for message in &request.messages {
            match message.role {
                MessageRole::System => system.push(message.content.clone()),
                MessageRole::Assistant => messages.push(AnthropicMessage {
                    role: "assistant".to_string(),
                    content: message.content.clone(),
                }),
                // Tool results flow back as user turns
                MessageRole::User | MessageRole::Tool => messages.push(AnthropicMessage {
                    role: "user".to_string(),
                    content: message.content.clone(),
                }),
            }
        }

        AnthropicRequest {
            model: request.model.as_str().to_string(),
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system: if system.is_empty() {
                None
            } else {
                Some(system.join("\n"))
            },
            messages,
            temperature: request.temperature,
        }
    }

    fn classify(&self, status: u16, body: &str) -> RelayError {
        let kind = match status {
            429 => ProviderErrorKind::Quota,
            408 => ProviderErrorKind::Timeout,
            400 if body.contains("policy") => ProviderErrorKind::PolicyViolation,
            s if s >= 500 || s == 529 => ProviderErrorKind::Retryable,
            _ => ProviderErrorKind::Fatal,
        };
        RelayError::provider(self.id.clone(), kind, truncate(body), Some(status))
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicProvider {
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
            "Dispatching Anthropic message"
        );

        let send = self
            .client
            .post(format!("{}/v1/messages", self.config.base_url))
            .header("x-api-key", self.config.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
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
                        .json::<AnthropicResponse>()
                        .await
                        .map_err(|e| {
                            RelayError::provider(
                                self.id.clone(),
                                ProviderErrorKind::Fatal,
                                format!("malformed response body: {e}"),
                                Some(status),
                            )
                        })
                        .map(AnthropicResponse::into_output)
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
            warn!(provider = %self.id, model = %request.model, error = %error, "Anthropic call failed");
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

fn truncate(body: &str) -> String {
    const MAX_CHARS: usize = 512;
    match body.char_indices().nth(MAX_CHARS) {
        Some((boundary, _)) => format!("{}…", &body[..boundary]),
        None => body.to_string(),
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    model: String,
    content: Vec<AnthropicContent>,
    #[serde(default)]
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

impl AnthropicResponse {
    fn into_output(self) -> ModelOutput {
        let content = self
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        let finish_reason = match self.stop_reason.as_deref() {
            Some("end_turn" | "stop_sequence") | None => FinishReason::Stop,
            Some("max_tokens") => FinishReason::Length,
            Some("tool_use") => FinishReason::ToolUse,
            Some(_) => FinishReason::Other,
        };

        ModelOutput {
            content,
            usage: TokenUsage::new(self.usage.input_tokens, self.usage.output_tokens),
            finish_reason,
            model_used: self.model,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{ChatMessage, ModelId};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_system_prompt_lifted_to_system_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(body_partial_json(serde_json::json!({
                "system": "Be brief",
                "messages": [{"role": "user", "content": "Hello"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "msg_1",
                "model": "claude-3-sonnet-20240229",
                "content": [{"type": "text", "text": "Hi"}],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 12, "output_tokens": 2}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = AnthropicProvider::new(
            AnthropicConfig::new("anthropic", "key").with_base_url(server.uri()),
        )
        .expect("provider");

        let call = ProviderCall::new(
            ModelId::new("claude-3-sonnet"),
            vec![ChatMessage::system("Be brief"), ChatMessage::user("Hello")],
        );

        let output = provider
            .call(&call, Deadline::after(Duration::from_secs(5)))
            .await
            .expect("call");

        assert_eq!(output.content, "Hi");
        assert_eq!(output.usage, TokenUsage::new(12, 2));
        assert_eq!(output.model_used, "claude-3-sonnet-20240229");
    }

    #[tokio::test]
    async fn test_overloaded_classified_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let provider = AnthropicProvider::new(
            AnthropicConfig::new("anthropic", "key").with_base_url(server.uri()),
        )
        .expect("provider");

        let call = ProviderCall::new(ModelId::new("claude-3-sonnet"), vec![ChatMessage::user("hi")]);
        let error = provider
            .call(&call, Deadline::after(Duration::from_secs(5)))
            .await
            .expect_err("should fail");

        assert!(error.is_retryable());
    }

    #[test]
    fn test_stop_reason_mapping() {
        let response = AnthropicResponse {
            model: "claude-3-sonnet".to_string(),
            content: vec![AnthropicContent {
                text: Some("x".to_string()),
            }],
            stop_reason: Some("max_tokens".to_string()),
            usage: AnthropicUsage {
                input_tokens: 1,
                output_tokens: 1,
            },
        };
        assert_eq!(response.into_output().finish_reason, FinishReason::Length);
    }
}
