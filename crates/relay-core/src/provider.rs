//! The provider adapter contract.
//!
//! An adapter normalizes one upstream API into the internal request/response
//! shapes. Adapters are shared immutably among concurrent requests.

use crate::deadline::Deadline;
use crate::error::RelayError;
use crate::request::ChatMessage;
use crate::response::ModelOutput;
use crate::types::{Capability, ModelId, ProviderId};
use async_trait::async_trait;
use std::time::Duration;

/// The normalized call handed to an adapter after model selection.
#[derive(Debug, Clone)]
pub struct ProviderCall {
    /// Model to invoke
    pub model: ModelId,
    /// Normalized chat messages
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature, when the caller set one
    pub temperature: Option<f32>,
    /// Output token cap, when the caller set one
    pub max_tokens: Option<u32>,
}

impl ProviderCall {
    /// Create a call for a model with the given messages.
    #[must_use]
    pub fn new(model: ModelId, messages: Vec<ChatMessage>) -> Self {
        Self {
            model,
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Set the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the output token cap.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Health snapshot reported by an adapter.
#[derive(Debug, Clone, Default)]
pub struct AdapterHealth {
    /// True when the adapter considers itself usable
    pub healthy: bool,
    /// Last error observed, if any
    pub last_error: Option<String>,
    /// Latency observed on the last successful call
    pub observed_latency: Option<Duration>,
}

impl AdapterHealth {
    /// A healthy report.
    #[must_use]
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            last_error: None,
            observed_latency: None,
        }
    }

    /// An unhealthy report carrying the last error.
    #[must_use]
    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            healthy: false,
            last_error: Some(error.into()),
            observed_latency: None,
        }
    }

    /// Attach the latency observed on the last successful call.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.observed_latency = Some(latency);
        self
    }
}

/// A normalized upstream AI provider.
///
/// `call` translates the request to the upstream schema, enforces the
/// deadline, and classifies failures into the provider error kinds. Retryable
/// errors may be retried once by the dispatcher; everything else flows back
/// unchanged.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// The provider this adapter fronts.
    fn id(&self) -> &ProviderId;

    /// Invoke the upstream model.
    ///
    /// # Errors
    /// Returns a `Provider` error classified by kind, or `Cancelled` when the
    /// deadline expires before dispatch.
    async fn call(&self, request: &ProviderCall, deadline: Deadline)
        -> Result<ModelOutput, RelayError>;

    /// Current health of the adapter.
    async fn health(&self) -> AdapterHealth;

    /// Whether this adapter supports a capability.
    fn supports(&self, capability: Capability) -> bool;
}
