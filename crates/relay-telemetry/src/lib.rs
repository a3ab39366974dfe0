//! # Relay Telemetry
//!
//! Observability for the gateway: logging initialization and the Prometheus
//! metric registry. Export transports (scrape endpoints, pushers) are
//! external collaborators; this crate only owns the instruments.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LoggingConfig};
pub use metrics::Metrics;
