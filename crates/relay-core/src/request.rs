//! Request contracts for the gateway.
//!
//! This module defines the inbound request shape that every transport
//! (HTTP mux, SDK, internal callers) normalizes into before entering the
//! pipeline.

use crate::error::RelayError;
use crate::types::{CorrelationId, ModelId, ProviderId, QualityTier, RequestId, ScopeTuple};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Unified gateway request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayRequest {
    /// Unique request identifier, generated when the caller omits one
    #[serde(default = "RequestId::generate")]
    pub request_id: RequestId,

    /// Correlation identifier carried across services
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,

    /// Chat messages or a single prompt
    pub content: RequestContent,

    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Routing and billing metadata
    #[serde(default)]
    pub metadata: RequestMetadata,

    /// Caller constraints on routing
    #[serde(default)]
    pub constraints: RequestConstraints,
}

impl RelayRequest {
    /// Create a builder.
    #[must_use]
    pub fn builder() -> RelayRequestBuilder {
        RelayRequestBuilder::default()
    }

    /// The effective quality tier for routing.
    #[must_use]
    pub fn quality_tier(&self) -> QualityTier {
        self.metadata.quality_requirement.unwrap_or_default()
    }

    /// Validate the request shape.
    ///
    /// # Errors
    /// Returns `InvalidRequest` if any field is malformed.
    pub fn validate(&self) -> Result<(), RelayError> {
        match &self.content {
            RequestContent::Messages(messages) => {
                if messages.is_empty() {
                    return Err(RelayError::invalid_request(
                        "messages cannot be empty",
                        Some("content".to_string()),
                    ));
                }
            }
            RequestContent::Prompt { prompt, .. } => {
                if prompt.is_empty() {
                    return Err(RelayError::invalid_request(
                        "prompt cannot be empty",
                        Some("content.prompt".to_string()),
                    ));
                }
            }
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(RelayError::invalid_request(
                    format!("temperature must be between 0.0 and 2.0, got {temperature}"),
                    Some("temperature".to_string()),
                ));
            }
        }

        if let Some(max_tokens) = self.max_tokens {
            if max_tokens == 0 {
                return Err(RelayError::invalid_request(
                    "max_tokens must be positive",
                    Some("max_tokens".to_string()),
                ));
            }
        }

        if let Some(max_cost) = self.constraints.max_cost {
            if max_cost < Decimal::ZERO {
                return Err(RelayError::invalid_request(
                    "max_cost cannot be negative",
                    Some("constraints.max_cost".to_string()),
                ));
            }
        }

        Ok(())
    }

    /// The scope tuple this request is billed to.
    #[must_use]
    pub fn scope(&self) -> ScopeTuple {
        ScopeTuple {
            user_id: self.metadata.user_id.clone(),
            team_id: self.metadata.team_id.clone(),
            organization_id: self.metadata.organization_id.clone(),
            project_id: self.metadata.project_id.clone(),
        }
    }

    /// Flatten the content into chat messages.
    ///
    /// A plain prompt becomes a user message, preceded by a system message
    /// when a system prompt is present.
    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        match &self.content {
            RequestContent::Messages(messages) => messages.clone(),
            RequestContent::Prompt {
                prompt,
                system_prompt,
            } => {
                let mut messages = Vec::with_capacity(2);
                if let Some(system) = system_prompt {
                    messages.push(ChatMessage::system(system.clone()));
                }
                messages.push(ChatMessage::user(prompt.clone()));
                messages
            }
        }
    }
}

/// Request content: an ordered chat or a single prompt.
///
/// Mixed shapes do not deserialize and surface as `InvalidRequest` at the
/// transport boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestContent {
    /// Ordered chat messages
    Messages(Vec<ChatMessage>),
    /// A single text prompt with an optional system prompt
    Prompt {
        /// The prompt text
        prompt: String,
        /// Optional system prompt
        #[serde(default, skip_serializing_if = "Option::is_none")]
        system_prompt: Option<String>,
    },
}

/// Chat message with role and content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message author
    pub role: MessageRole,

    /// Content of the message
    pub content: String,

    /// Optional name of the author
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Tool invocation attached to the message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolInvocation>,
}

impl ChatMessage {
    /// Create a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
            name: None,
            tool_call: None,
        }
    }

    /// Create a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            name: None,
            tool_call: None,
        }
    }

    /// Create an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            name: None,
            tool_call: None,
        }
    }

    /// Set the author name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach a tool invocation.
    #[must_use]
    pub fn with_tool_call(mut self, tool_call: ToolInvocation) -> Self {
        self.tool_call = Some(tool_call);
        self
    }
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System message
    System,
    /// User message
    User,
    /// Assistant message
    Assistant,
    /// Tool response message
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// A tool/function invocation attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Function name
    pub name: String,
    /// Function arguments as a JSON string
    pub arguments: String,
}

/// Request metadata for routing and billing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestMetadata {
    /// User identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Organization identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,

    /// Team identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,

    /// Project identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    /// Task type hint for steering (e.g. "code-review", "summarize")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,

    /// Requested quality tier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_requirement: Option<QualityTier>,

    /// Budget priority hint forwarded to constraint checks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_priority: Option<String>,

    /// Roles the caller holds, consulted for budget overrides
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
}

/// Caller constraints on routing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestConstraints {
    /// Preferred model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_model: Option<ModelId>,

    /// Preferred provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_provider: Option<ProviderId>,

    /// Upper bound on request cost
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cost: Option<Decimal>,

    /// Upper bound on request latency
    #[serde(default, with = "humantime_serde::option")]
    pub max_latency: Option<Duration>,

    /// Streaming requested (bypasses the response cache)
    #[serde(default)]
    pub stream: bool,
}

/// Builder for [`RelayRequest`].
#[derive(Debug, Default)]
pub struct RelayRequestBuilder {
    request_id: Option<RequestId>,
    correlation_id: Option<CorrelationId>,
    content: Option<RequestContent>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    metadata: RequestMetadata,
    constraints: RequestConstraints,
}

impl RelayRequestBuilder {
    /// Set the request ID.
    #[must_use]
    pub fn request_id(mut self, id: RequestId) -> Self {
        self.request_id = Some(id);
        self
    }

    /// Set the correlation ID.
    #[must_use]
    pub fn correlation_id(mut self, id: CorrelationId) -> Self {
        self.correlation_id = Some(id);
        self
    }

    /// Set chat messages as the content.
    #[must_use]
    pub fn messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.content = Some(RequestContent::Messages(messages));
        self
    }

    /// Set a plain prompt as the content.
    #[must_use]
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.content = Some(RequestContent::Prompt {
            prompt: prompt.into(),
            system_prompt: None,
        });
        self
    }

    /// Set the temperature.
    #[must_use]
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set max_tokens.
    #[must_use]
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the metadata.
    #[must_use]
    pub fn metadata(mut self, metadata: RequestMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set the constraints.
    #[must_use]
    pub fn constraints(mut self, constraints: RequestConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Build and validate the request.
    ///
    /// # Errors
    /// Returns `InvalidRequest` if content is missing or malformed.
    pub fn build(self) -> Result<RelayRequest, RelayError> {
        let content = self.content.ok_or_else(|| {
            RelayError::invalid_request("content is required", Some("content".to_string()))
        })?;

        let request = RelayRequest {
            request_id: self.request_id.unwrap_or_else(RequestId::generate),
            correlation_id: self.correlation_id,
            content,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            metadata: self.metadata,
            constraints: self.constraints,
        };

        request.validate()?;

        Ok(request)
    }
}
