//! Structured logging and tracing configuration.
//!
//! Provides setup for observability using the `tracing` crate with:
//! - Structured logging with JSON output option
//! - Configurable log levels
//! - Per-record spans so every log line carries the natural key

use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Registry,
};

/// Initialize tracing with the given level and output format.
///
/// `RUST_LOG`, when set, takes precedence over `level`. Logs go to stderr so
/// that stdout stays free for command output.
///
/// # Panics
///
/// Panics if tracing subscriber has already been initialized in this process.
pub fn init_tracing(level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        let json_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_current_span(true)
            .with_file(true)
            .with_line_number(true);

        Registry::default().with(env_filter).with(json_layer).init();
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_file(true)
            .with_line_number(true);

        Registry::default().with(env_filter).with(fmt_layer).init();
    }

    tracing::debug!("Tracing initialized: level={}, json={}", level, json);
}

/// Span helpers for the ingestion pipeline.
pub mod spans {
    use tracing::{info_span, Span};

    /// Create a span for a single crawl record.
    ///
    /// # Arguments
    ///
    /// * `entity` - Record kind (book, category, quote, author)
    /// * `key` - Natural key of the record
    #[must_use]
    pub fn record_span(entity: &str, key: &str) -> Span {
        info_span!("record", entity = %entity, key = %key)
    }

    /// Create a span for a database operation.
    #[must_use]
    pub fn db_span(operation: &str, table: &str) -> Span {
        info_span!(
            "db_operation",
            operation = %operation,
            table = %table,
        )
    }
}
