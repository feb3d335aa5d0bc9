//! Per-query performance tracking
//!
//! Every executed query leaves one immutable sample in a bounded history;
//! the self-optimization pass reads the history to derive hit rates and
//! latency aggregates.

use crate::engine::QueryType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Maximum number of retained samples; older ones are dropped
const HISTORY_LIMIT: usize = 1000;

/// Snapshot of engine resource state at sample time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// Resident cache entries
    pub cache_entries: usize,
    /// Cache capacity at sample time
    pub cache_max_entries: usize,
    /// Partitions currently indexed
    pub partition_count: usize,
}

/// One immutable record per executed query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPerformanceMetrics {
    pub query_id: Uuid,
    pub query_type: QueryType,
    pub execution_time: Duration,
    pub cache_hit: bool,
    pub result_count: usize,
    pub relevance_score: f32,
    pub resources: ResourceSnapshot,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate view over the retained history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub total_queries: u64,
    pub sampled_queries: usize,
    pub cache_hit_rate: f64,
    pub avg_execution_time_ms: f64,
    pub avg_relevance_score: f64,
    pub queries_by_type: HashMap<String, u64>,
}

/// Bounded ring of performance samples
pub struct MetricsTracker {
    history: Mutex<VecDeque<QueryPerformanceMetrics>>,
    total_queries: Mutex<u64>,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self {
            history: Mutex::new(VecDeque::with_capacity(HISTORY_LIMIT)),
            total_queries: Mutex::new(0),
        }
    }

    /// Append a sample, trimming the history to the most recent 1000.
    pub async fn record(&self, sample: QueryPerformanceMetrics) {
        let mut history = self.history.lock().await;
        history.push_back(sample);
        while history.len() > HISTORY_LIMIT {
            history.pop_front();
        }
        *self.total_queries.lock().await += 1;
    }

    /// Hit rate over the retained history; `None` when no samples exist.
    pub async fn cache_hit_rate(&self) -> Option<f64> {
        let history = self.history.lock().await;
        if history.is_empty() {
            return None;
        }
        let hits = history.iter().filter(|m| m.cache_hit).count();
        Some(hits as f64 / history.len() as f64)
    }

    pub async fn avg_execution_time_ms(&self) -> Option<f64> {
        let history = self.history.lock().await;
        if history.is_empty() {
            return None;
        }
        let total: f64 = history
            .iter()
            .map(|m| m.execution_time.as_secs_f64() * 1000.0)
            .sum();
        Some(total / history.len() as f64)
    }

    pub async fn len(&self) -> usize {
        self.history.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.history.lock().await.is_empty()
    }

    pub async fn stats(&self) -> PerformanceStats {
        let history = self.history.lock().await;
        let total_queries = *self.total_queries.lock().await;

        if history.is_empty() {
            return PerformanceStats {
                total_queries,
                sampled_queries: 0,
                cache_hit_rate: 0.0,
                avg_execution_time_ms: 0.0,
                avg_relevance_score: 0.0,
                queries_by_type: HashMap::new(),
            };
        }

        let hits = history.iter().filter(|m| m.cache_hit).count();
        let total_time_ms: f64 = history
            .iter()
            .map(|m| m.execution_time.as_secs_f64() * 1000.0)
            .sum();
        let total_relevance: f64 = history.iter().map(|m| m.relevance_score as f64).sum();

        let mut queries_by_type: HashMap<String, u64> = HashMap::new();
        for sample in history.iter() {
            *queries_by_type
                .entry(sample.query_type.to_string())
                .or_insert(0) += 1;
        }

        PerformanceStats {
            total_queries,
            sampled_queries: history.len(),
            cache_hit_rate: hits as f64 / history.len() as f64,
            avg_execution_time_ms: total_time_ms / history.len() as f64,
            avg_relevance_score: total_relevance / history.len() as f64,
            queries_by_type,
        }
    }

    /// Most recent samples, newest last. Used by tests and diagnostics.
    pub async fn recent(&self, count: usize) -> Vec<QueryPerformanceMetrics> {
        let history = self.history.lock().await;
        history
            .iter()
            .rev()
            .take(count)
            .rev()
            .cloned()
            .collect()
    }
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self::new()
    }
}
