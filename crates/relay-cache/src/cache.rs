//! The response cache.
//!
//! A TTL cache keyed by fingerprint, fronted by the single-flight table.
//! Cache problems never fail a request; every failure path degrades to
//! miss handling.

use crate::fingerprint::Fingerprint;
use crate::single_flight::{FlightLease, FlightWait, SingleFlight};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use relay_core::{Deadline, ModelId, ModelOutput, ProviderId};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// A cached response and the model that produced it.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    /// The normalized model output
    pub output: ModelOutput,
    /// The model that produced it
    pub model: ModelId,
    /// The provider that produced it
    pub provider: ProviderId,
    /// When the entry was stored
    pub stored_at: DateTime<Utc>,
}

/// Response cache configuration.
#[derive(Debug, Clone)]
pub struct ResponseCacheConfig {
    /// Whether the cache participates at all
    pub enabled: bool,
    /// TTL applied when the caller sets no override
    pub default_ttl: Duration,
    /// Upper bound on stored entries
    pub max_entries: usize,
    /// Cap on how long a waiter blocks on an in-flight build
    pub max_flight_wait: Duration,
}

impl Default for ResponseCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl: Duration::from_secs(3600),
            max_entries: 10_000,
            max_flight_wait: Duration::from_secs(10),
        }
    }
}

/// What the pipeline should do after consulting the cache.
pub enum CacheAdmission {
    /// Serve this response; record a zero-cost usage entry.
    Hit(CachedResponse),
    /// Dispatch, then complete (or drop) the lease.
    Build(Option<FlightLease>),
}

struct CacheEntry {
    value: CachedResponse,
    expires_at: Instant,
}

/// Fingerprint-keyed response cache with single-flight admission.
pub struct ResponseCache {
    config: ResponseCacheConfig,
    entries: DashMap<Fingerprint, CacheEntry>,
    flights: SingleFlight,
}

impl ResponseCache {
    /// Create a cache.
    #[must_use]
    pub fn new(config: ResponseCacheConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
            flights: SingleFlight::new(),
        }
    }

    /// Create a cache with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(ResponseCacheConfig::default())
    }

    /// Whether the cache is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Look up a fingerprint without joining the flight table.
    #[must_use]
    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<CachedResponse> {
        if !self.config.enabled {
            return None;
        }
        let expired = match self.entries.get(fingerprint) {
            Some(entry) if entry.expires_at > Instant::now() => {
                trace!(fingerprint = %fingerprint, "Cache hit");
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(fingerprint);
        }
        None
    }

    /// Consult the cache for one request: a fresh entry is a hit; otherwise
    /// join the single-flight table so only one concurrent builder runs.
    ///
    /// Waiters are bounded by the request deadline and the configured flight
    /// wait; on expiry they build without a lease.
    pub async fn admit(&self, fingerprint: &Fingerprint, deadline: Deadline) -> CacheAdmission {
        if !self.config.enabled {
            return CacheAdmission::Build(None);
        }

        if let Some(hit) = self.lookup(fingerprint) {
            return CacheAdmission::Hit(hit);
        }

        let max_wait = deadline.remaining_capped(self.config.max_flight_wait);
        match self.flights.join(fingerprint, max_wait).await {
            FlightWait::Lead(lease) => CacheAdmission::Build(Some(lease)),
            FlightWait::Shared(response) => CacheAdmission::Hit(response),
            FlightWait::Miss => CacheAdmission::Build(None),
        }
    }

    /// Store a response under a fingerprint.
    pub fn store(
        &self,
        fingerprint: Fingerprint,
        response: CachedResponse,
        ttl_override: Option<Duration>,
    ) {
        if !self.config.enabled {
            return;
        }

        if self.entries.len() >= self.config.max_entries {
            self.evict_expired();
            if self.entries.len() >= self.config.max_entries {
                debug!("Response cache full; dropping store");
                return;
            }
        }

        let ttl = ttl_override.unwrap_or(self.config.default_ttl);
        debug!(fingerprint = %fingerprint, ttl_secs = ttl.as_secs(), "Caching response");
        self.entries.insert(
            fingerprint,
            CacheEntry {
                value: response,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Number of stored entries, counting expired ones not yet swept.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
    }
}
