//! Feed service metrics
//!
//! Registered on the process-wide Prometheus registry and exposed on `/metrics`
//! together with the cache counters.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};
use std::time::Duration;

static FEED_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_requests_total",
        "Feed pages served, by where the page came from (cache/followees/global)",
        &["source"]
    )
    .expect("Failed to register feed requests metric")
});

static FEED_ASSEMBLY_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "feed_assembly_duration_seconds",
        "Time to serve a feed page",
        &["source"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register feed assembly duration metric")
});

static MUTATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_mutations_total",
        "Mutations handled, by operation",
        &["operation"]
    )
    .expect("Failed to register feed mutations metric")
});

/// Record a served feed page
pub fn record_feed_request(source: &str, duration: Duration) {
    FEED_REQUESTS_TOTAL.with_label_values(&[source]).inc();
    FEED_ASSEMBLY_DURATION_SECONDS
        .with_label_values(&[source])
        .observe(duration.as_secs_f64());
}

/// Record a reaction, comment or follow-graph mutation
pub fn record_mutation(operation: &str) {
    MUTATIONS_TOTAL.with_label_values(&[operation]).inc();
}

/// Text exposition of every metric on the default registry
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
