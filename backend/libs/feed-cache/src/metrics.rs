//! Cache metrics for observability

use crate::keys::CacheKey;
use prometheus::{CounterVec, Opts, Registry};
use std::sync::OnceLock;

static METRICS: OnceLock<CacheMetricsInner> = OnceLock::new();

struct CacheMetricsInner {
    hits: CounterVec,
    misses: CounterVec,
    writes: CounterVec,
    invalidations: CounterVec,
    errors: CounterVec,
}

impl CacheMetricsInner {
    fn new() -> Self {
        Self {
            hits: CounterVec::new(
                Opts::new("feed_cache_hits_total", "Total cache hits"),
                &["namespace"],
            )
            .expect("valid metric definition"),
            misses: CounterVec::new(
                Opts::new("feed_cache_misses_total", "Total cache misses"),
                &["namespace"],
            )
            .expect("valid metric definition"),
            writes: CounterVec::new(
                Opts::new("feed_cache_writes_total", "Total cache writes"),
                &["namespace"],
            )
            .expect("valid metric definition"),
            invalidations: CounterVec::new(
                Opts::new(
                    "feed_cache_invalidations_total",
                    "Total cache invalidations",
                ),
                &["namespace"],
            )
            .expect("valid metric definition"),
            errors: CounterVec::new(
                Opts::new("feed_cache_errors_total", "Total absorbed cache errors"),
                &["namespace", "operation"],
            )
            .expect("valid metric definition"),
        }
    }

    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.hits.clone()))?;
        registry.register(Box::new(self.misses.clone()))?;
        registry.register(Box::new(self.writes.clone()))?;
        registry.register(Box::new(self.invalidations.clone()))?;
        registry.register(Box::new(self.errors.clone()))?;
        Ok(())
    }
}

fn get_metrics() -> &'static CacheMetricsInner {
    METRICS.get_or_init(CacheMetricsInner::new)
}

/// Cache metrics wrapper
#[derive(Clone, Default)]
pub struct CacheMetrics;

impl CacheMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Register metrics with a Prometheus registry
    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        get_metrics().register(registry)
    }

    pub fn record_hit(&self, key: &str) {
        inc_namespace(&get_metrics().hits, key);
    }

    pub fn record_miss(&self, key: &str) {
        inc_namespace(&get_metrics().misses, key);
    }

    pub fn record_write(&self, key: &str) {
        inc_namespace(&get_metrics().writes, key);
    }

    /// `key` may be a pattern; its namespace is the part before the first `:`
    pub fn record_invalidation(&self, key: &str) {
        inc_namespace(&get_metrics().invalidations, key);
    }

    pub fn record_error(&self, key: &str, operation: &str) {
        get_metrics()
            .errors
            .with_label_values(&[CacheKey::namespace(key), operation])
            .inc();
    }
}

fn inc_namespace(counter: &CounterVec, key: &str) {
    counter.with_label_values(&[CacheKey::namespace(key)]).inc();
}
