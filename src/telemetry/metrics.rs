//! Prometheus metrics definitions.

use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec,
    TextEncoder,
};

/// Records processed, by entity and outcome.
pub static RECORDS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "catalog_records_total",
        "Total number of crawl records processed",
        &["entity", "outcome"]
    )
    .unwrap()
});

/// Embedding decisions, by outcome (computed, retained, unavailable, failed).
pub static EMBEDDINGS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "catalog_embeddings_total",
        "Embedding computations by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Database reconnects performed by the connection manager.
pub static RECONNECTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "catalog_reconnects_total",
        "Number of times a stale database connection was replaced"
    )
    .unwrap()
});

/// Initialize all metrics (call once at startup).
pub fn init_metrics() {
    // Access lazy statics to register them
    let _ = &*RECORDS_TOTAL;
    let _ = &*EMBEDDINGS_TOTAL;
    let _ = &*RECONNECTS_TOTAL;

    tracing::debug!("Prometheus metrics initialized");
}

/// Render every registered metric in the Prometheus text format.
#[must_use]
pub fn render_metrics() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
