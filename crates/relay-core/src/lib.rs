//! # Relay Core
//!
//! Core types, traits, and error handling for the RelayCore gateway.
//!
//! This crate provides the foundational types used throughout the gateway:
//! - Request and response contracts
//! - The provider adapter trait
//! - Error taxonomy and stable reason codes
//! - Validated domain types (newtypes)
//! - Cache control header contracts

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod deadline;
pub mod error;
pub mod headers;
pub mod provider;
pub mod request;
pub mod response;
pub mod types;

// Re-export commonly used types
pub use deadline::Deadline;
pub use error::{ProviderErrorKind, RelayError, RelayResult};
pub use headers::{CacheControl, CacheMode, OptimizeLevel};
pub use provider::{AdapterHealth, ProviderAdapter, ProviderCall};
pub use request::{
    ChatMessage, MessageRole, RelayRequest, RequestConstraints, RequestContent, RequestMetadata,
    ToolInvocation,
};
pub use response::{
    BudgetImpact, CacheStatus, FinishReason, ModelOutput, RelayResponse, TokenUsage,
};
pub use types::{
    BudgetHealth, BudgetId, Capability, CorrelationId, ModelId, ProviderId, QualityTier,
    RequestId, ScopeKind, ScopeTuple,
};
