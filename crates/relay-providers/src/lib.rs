//! # Relay Providers
//!
//! Provider profiles, the provider registry, and upstream adapters.
//!
//! This crate provides:
//! - Provider profiles with per-token pricing, capabilities, and fallbacks
//! - A registry mapping models to profiles and providers to adapters
//! - Health bookkeeping fed by adapter outcomes
//! - Adapters for OpenAI, Anthropic, and the internal specialist service

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod profile;
pub mod registry;

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "anthropic")]
pub mod anthropic;

#[cfg(feature = "specialist")]
pub mod specialist;

// Re-export main types
pub use profile::ProviderProfile;
pub use registry::{HealthRecord, ProviderRegistry};

#[cfg(feature = "openai")]
pub use openai::{OpenAiConfig, OpenAiProvider};

#[cfg(feature = "anthropic")]
pub use anthropic::{AnthropicConfig, AnthropicProvider};

#[cfg(feature = "specialist")]
pub use specialist::{SpecialistConfig, SpecialistProvider};
