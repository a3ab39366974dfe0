//! # Relay Pipeline
//!
//! End-to-end request orchestration: admission control, steering, budget
//! pre-checks, cost-based model selection, cached or dispatched execution
//! with fallback, and at-most-once billed usage recording.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod admission;
pub mod context;
pub mod dispatch;
pub mod pipeline;

// Re-export main types
pub use admission::AdmissionControl;
pub use context::build_context;
pub use pipeline::{PipelineConfig, RequestOptions, RequestPipeline};
