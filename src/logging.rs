//! Logging configuration and utilities for the GraphRAG engine
//!
//! Provides structured logging for:
//! - Query dispatch and result merging
//! - Cache hits, misses, and evictions
//! - Graph partitioning runs
//! - Self-optimization passes

use std::io;
use tracing::Span;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Initialize the logging system with a human-readable format
pub fn init_logging() -> eyre::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,graphrag_engine=debug"));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::ENTER | FmtSpan::CLOSE)
        .with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("GraphRAG engine logging initialized");
    Ok(())
}

/// Initialize logging with JSON output for structured log pipelines
pub fn init_json_logging() -> eyre::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,graphrag_engine=debug"));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_span_events(FmtSpan::ENTER | FmtSpan::CLOSE)
        .json()
        .with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("GraphRAG engine logging initialized with JSON format");
    Ok(())
}

/// Create a tracing span for one optimized query
pub fn query_span(query_id: &str, query_type: &str) -> Span {
    tracing::info_span!(
        "optimized_query",
        query_id = %query_id,
        query_type = query_type,
        cache_hit = tracing::field::Empty,
        result_count = tracing::field::Empty,
        relevance_score = tracing::field::Empty,
        execution_time_ms = tracing::field::Empty,
    )
}

/// Create a tracing span for a graph partitioning run
pub fn partition_span(node_count: usize, edge_count: usize) -> Span {
    tracing::info_span!(
        "partition_graph",
        node_count = node_count,
        edge_count = edge_count,
        partitions = tracing::field::Empty,
    )
}

/// Structured logging for performance measurements
pub struct PerformanceLogger {
    start_time: std::time::Instant,
    operation: String,
}

impl PerformanceLogger {
    pub fn start(operation: &str) -> Self {
        tracing::debug!("Starting performance measurement for: {}", operation);
        Self {
            start_time: std::time::Instant::now(),
            operation: operation.to_string(),
        }
    }

    pub fn log_milestone(&self, milestone: &str) {
        let elapsed = self.start_time.elapsed();
        tracing::debug!(
            operation = %self.operation,
            milestone = milestone,
            elapsed_ms = elapsed.as_millis(),
            "Performance milestone reached"
        );
    }

    pub fn finish(self) {
        let total_time = self.start_time.elapsed();
        tracing::info!(
            operation = %self.operation,
            total_time_ms = total_time.as_millis(),
            "Performance measurement completed"
        );
    }
}

/// Log a self-optimization outcome
pub fn log_optimization(
    cache_hit_rate: f64,
    avg_execution_time_ms: f64,
    cache_resized: bool,
    new_max_entries: Option<usize>,
) {
    tracing::info!(
        cache_hit_rate = cache_hit_rate,
        avg_execution_time_ms = avg_execution_time_ms,
        cache_resized = cache_resized,
        new_max_entries = new_max_entries,
        "Self-optimization pass completed"
    );
}
