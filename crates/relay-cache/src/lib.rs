//! # Relay Cache
//!
//! Response caching for the gateway:
//! - Deterministic request fingerprints
//! - A TTL cache keyed by fingerprint
//! - Single-flight leases so one builder runs per fingerprint

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod fingerprint;
pub mod single_flight;

// Re-export main types
pub use cache::{CacheAdmission, CachedResponse, ResponseCache, ResponseCacheConfig};
pub use fingerprint::Fingerprint;
pub use single_flight::{FlightLease, FlightWait, SingleFlight};
