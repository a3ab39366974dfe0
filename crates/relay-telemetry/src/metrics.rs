//! Prometheus instruments for the request pipeline.

use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use relay_core::CacheStatus;

/// Metric instruments shared across the pipeline.
pub struct Metrics {
    registry: Registry,
    requests_total: IntCounterVec,
    cache_events: IntCounterVec,
    budget_denials: IntCounter,
    provider_errors: IntCounterVec,
    downgrades: IntCounter,
    request_duration: Histogram,
}

impl Metrics {
    /// Create and register the gateway instruments.
    ///
    /// # Errors
    /// Returns the underlying registration error.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("relay_requests_total", "Requests by terminal outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let cache_events = IntCounterVec::new(
            Opts::new("relay_cache_events_total", "Response cache outcomes"),
            &["status"],
        )?;
        registry.register(Box::new(cache_events.clone()))?;

        let budget_denials = IntCounter::new(
            "relay_budget_denials_total",
            "Requests denied by budget constraints",
        )?;
        registry.register(Box::new(budget_denials.clone()))?;

        let provider_errors = IntCounterVec::new(
            Opts::new("relay_provider_errors_total", "Provider failures by kind"),
            &["provider", "kind"],
        )?;
        registry.register(Box::new(provider_errors.clone()))?;

        let downgrades = IntCounter::new(
            "relay_downgrades_total",
            "Requests downgraded to the economy tier",
        )?;
        registry.register(Box::new(downgrades.clone()))?;

        let request_duration = Histogram::with_opts(
            HistogramOpts::new(
                "relay_request_duration_seconds",
                "End-to-end request latency",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        )?;
        registry.register(Box::new(request_duration.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            cache_events,
            budget_denials,
            provider_errors,
            downgrades,
            request_duration,
        })
    }

    /// Count a terminal request outcome by its stable reason code.
    pub fn record_outcome(&self, outcome: &str) {
        self.requests_total.with_label_values(&[outcome]).inc();
    }

    /// Count a cache outcome.
    pub fn record_cache(&self, status: CacheStatus) {
        self.cache_events
            .with_label_values(&[status.as_str()])
            .inc();
    }

    /// Count a budget denial.
    pub fn record_budget_denial(&self) {
        self.budget_denials.inc();
    }

    /// Count a provider failure.
    pub fn record_provider_error(&self, provider: &str, kind: &str) {
        self.provider_errors
            .with_label_values(&[provider, kind])
            .inc();
    }

    /// Count a quality downgrade.
    pub fn record_downgrade(&self) {
        self.downgrades.inc();
    }

    /// Observe an end-to-end request latency in seconds.
    pub fn observe_duration(&self, seconds: f64) {
        self.request_duration.observe(seconds);
    }

    /// The registry, for an external export transport to scrape.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render the current metrics in the Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        encoder
            .encode_to_string(&self.registry.gather())
            .unwrap_or_default()
    }
}
