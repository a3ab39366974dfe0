//! # Relay Cost
//!
//! Cost-side intelligence for the gateway:
//! - Token estimation from request content
//! - The cost model over provider profiles
//! - Cost-based model selection strategies

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod estimator;
pub mod model;
pub mod optimizer;

// Re-export main types
pub use estimator::{estimate_request, estimate_text, estimate_value, TokenEstimate};
pub use model::CostModel;
pub use optimizer::{choose_candidate, OptimizeStrategy};
