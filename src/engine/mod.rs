//! Hybrid query engine with self-optimizing cache behavior
//!
//! Orchestrates six query types against the vector store, graph store, and
//! embedding model. Every query is wrapped with a cache lookup keyed by a
//! stable hash of the request; misses dispatch to the query-type handler,
//! rank and merge the results, and store them with a TTL scaled by result
//! quality. Each query leaves a performance sample that a separately
//! invoked optimization pass uses to resize the cache.

pub mod metrics;

pub use metrics::{MetricsTracker, PerformanceStats, QueryPerformanceMetrics, ResourceSnapshot};

use crate::cache::{CacheStats, IntelligentCache};
use crate::config::EngineConfig;
use crate::errors::{BackendError, EngineResult};
use crate::partition::{GraphPartitionManager, PartitionStats};
use crate::stores::{ScoredPoint, StoreHandles, TraversalPath};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

/// Hard ceiling for cache growth driven by the optimization pass
const CACHE_SIZE_CEILING: usize = 50_000;

/// TTL for per-entity cache entries populated by entity lookups
const ENTITY_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Fixed confidence tag applied to contextual-reasoning results
const REASONING_CONFIDENCE: f32 = 0.8;

/// The six supported query types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    SemanticSearch,
    GraphTraversal,
    HybridRetrieval,
    EntityLookup,
    RelationshipAnalysis,
    ContextualReasoning,
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            QueryType::SemanticSearch => "semantic_search",
            QueryType::GraphTraversal => "graph_traversal",
            QueryType::HybridRetrieval => "hybrid_retrieval",
            QueryType::EntityLookup => "entity_lookup",
            QueryType::RelationshipAnalysis => "relationship_analysis",
            QueryType::ContextualReasoning => "contextual_reasoning",
        };
        write!(f, "{name}")
    }
}

/// Which subsystem produced a result item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    Semantic,
    Graph,
    Entity,
    Relationship,
}

/// One ranked result returned to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultItem {
    pub id: String,
    pub content: String,
    pub score: f32,
    pub source: ResultSource,
    /// Reasoning confidence, set only by contextual reasoning
    pub confidence: Option<f32>,
    /// Traversal path for graph-derived results
    pub path: Option<TraversalPath>,
    pub metadata: serde_json::Value,
}

/// Response envelope for one optimized query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub results: Vec<ResultItem>,
    pub query_type: QueryType,
    pub relevance_score: f32,
    pub total_results: usize,
    pub error: Option<String>,
}

impl QueryResult {
    fn failed(query_type: QueryType, error: String) -> Self {
        Self {
            results: vec![],
            query_type,
            relevance_score: 0.0,
            total_results: 0,
            error: Some(error),
        }
    }
}

/// Report produced by one self-optimization pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub analyzed_samples: usize,
    pub cache_hit_rate: Option<f64>,
    pub avg_execution_time_ms: Option<f64>,
    pub cache_resized: bool,
    pub new_cache_max_entries: Option<usize>,
    pub partition_analysis: PartitionStats,
    pub recommendations: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Combined operational statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStats {
    pub queries: PerformanceStats,
    pub cache: CacheStats,
    pub partitions: PartitionStats,
}

/// Self-optimizing hybrid retrieval engine
///
/// Owns the cache, partition manager, and metrics history; constructed
/// explicitly and injected wherever queries are handled.
pub struct GraphRagEngine {
    config: EngineConfig,
    cache: IntelligentCache<QueryResult>,
    partitions: GraphPartitionManager,
    metrics: MetricsTracker,
    stores: StoreHandles,
}

impl GraphRagEngine {
    pub fn new(config: EngineConfig, stores: StoreHandles) -> Self {
        let cache = IntelligentCache::new(config.cache.max_entries, config.cache.strategy);
        let partitions = GraphPartitionManager::new(
            config.partition.max_partition_size,
            config.partition.embedding_dim,
        );
        Self {
            config,
            cache,
            partitions,
            metrics: MetricsTracker::new(),
            stores,
        }
    }

    /// The partition manager, for repartition scheduling by the operator.
    pub fn partition_manager(&self) -> &GraphPartitionManager {
        &self.partitions
    }

    /// Execute a query through the cache, dispatching on a miss.
    ///
    /// Never returns an error to the caller: dispatch failures are folded
    /// into the response's `error` field with empty results.
    pub async fn optimized_query(
        &self,
        query: &str,
        query_type: QueryType,
        context: &serde_json::Map<String, serde_json::Value>,
    ) -> QueryResult {
        let query_id = Uuid::new_v4();
        let span = crate::logging::query_span(&query_id.to_string(), &query_type.to_string());
        self.run_query(query_id, query, query_type, context)
            .instrument(span)
            .await
    }

    async fn run_query(
        &self,
        query_id: Uuid,
        query: &str,
        query_type: QueryType,
        context: &serde_json::Map<String, serde_json::Value>,
    ) -> QueryResult {
        let start = Instant::now();
        let cache_key = self.cache_key(query, query_type, context);

        if let Some(cached) = self.cache.get(&cache_key).await {
            debug!(query_id = %query_id, "cache hit");
            self.record_sample(query_id, query_type, start.elapsed(), true, &cached)
                .await;
            return cached;
        }

        let response = match self.dispatch(query, query_type).await {
            Ok((results, relevance_score)) => QueryResult {
                total_results: results.len(),
                results,
                query_type,
                relevance_score,
                error: None,
            },
            Err(error) => {
                warn!(query_id = %query_id, error = %error, "query dispatch failed");
                let response = QueryResult::failed(query_type, error.to_string());
                self.record_sample(query_id, query_type, start.elapsed(), false, &response)
                    .await;
                return response;
            }
        };

        let ttl = Self::compute_ttl(query_type, response.relevance_score);
        self.cache.put(&cache_key, response.clone(), Some(ttl)).await;

        self.record_sample(query_id, query_type, start.elapsed(), false, &response)
            .await;
        response
    }

    /// Inspect the metrics history and adjust the cache configuration.
    ///
    /// A hit rate below 0.6 doubles the cache's maximum size, bounded by a
    /// hard ceiling; a hit rate above 0.9 only produces a shrink
    /// recommendation. Partition rebalancing is analyzed and reported but
    /// the decision is left to an operator.
    pub async fn optimize_performance(&self) -> OptimizationReport {
        let analyzed_samples = self.metrics.len().await;
        let cache_hit_rate = self.metrics.cache_hit_rate().await;
        let avg_execution_time_ms = self.metrics.avg_execution_time_ms().await;

        let mut cache_resized = false;
        let mut new_cache_max_entries = None;
        let mut recommendations = Vec::new();

        if let Some(hit_rate) = cache_hit_rate {
            let current_max = self.cache.max_entries().await;
            if hit_rate < 0.6 {
                let doubled = current_max.saturating_mul(2).min(CACHE_SIZE_CEILING);
                if doubled > current_max {
                    self.cache.set_max_entries(doubled).await;
                    cache_resized = true;
                    new_cache_max_entries = Some(doubled);
                    recommendations.push(format!(
                        "cache hit rate {hit_rate:.2} below 0.6; max entries raised to {doubled}"
                    ));
                } else {
                    recommendations.push(format!(
                        "cache hit rate {hit_rate:.2} below 0.6 but cache already at ceiling {CACHE_SIZE_CEILING}"
                    ));
                }
            } else if hit_rate > 0.9 {
                recommendations.push(format!(
                    "cache hit rate {hit_rate:.2} above 0.9; consider shrinking max entries from {current_max}"
                ));
            }
        }

        // Rebalancing analysis only; applying a repartition is an operator
        // decision because it invalidates the node index mid-flight.
        let partition_analysis = self.partitions.stats().await;
        if partition_analysis.partition_count > 0 {
            recommendations.push(format!(
                "{} partitions indexed; rebalancing decision left to operator",
                partition_analysis.partition_count
            ));
        }

        crate::logging::log_optimization(
            cache_hit_rate.unwrap_or(0.0),
            avg_execution_time_ms.unwrap_or(0.0),
            cache_resized,
            new_cache_max_entries,
        );

        OptimizationReport {
            analyzed_samples,
            cache_hit_rate,
            avg_execution_time_ms,
            cache_resized,
            new_cache_max_entries,
            partition_analysis,
            recommendations,
            timestamp: Utc::now(),
        }
    }

    /// Operational statistics for tooling.
    pub async fn get_performance_stats(&self) -> EngineStats {
        EngineStats {
            queries: self.metrics.stats().await,
            cache: self.cache.stats().await,
            partitions: self.partitions.stats().await,
        }
    }

    async fn dispatch(
        &self,
        query: &str,
        query_type: QueryType,
    ) -> EngineResult<(Vec<ResultItem>, f32)> {
        match query_type {
            QueryType::SemanticSearch => {
                let items = self.semantic_search(query).await?;
                let relevance = mean_score(&items);
                Ok((items, relevance))
            }
            QueryType::GraphTraversal => {
                let items = self.graph_traversal(query).await?;
                let relevance = mean_score(&items);
                Ok((items, relevance))
            }
            QueryType::HybridRetrieval => self.hybrid_retrieval(query).await,
            QueryType::EntityLookup => {
                let items = self.entity_lookup(query).await?;
                let relevance = mean_score(&items);
                Ok((items, relevance))
            }
            QueryType::RelationshipAnalysis => {
                let items = self.relationship_analysis(query).await?;
                let relevance = mean_score(&items);
                Ok((items, relevance))
            }
            QueryType::ContextualReasoning => self.contextual_reasoning(query).await,
        }
    }

    /// Embed the query and run a thresholded top-k similarity search.
    async fn semantic_search(&self, query: &str) -> EngineResult<Vec<ResultItem>> {
        let embedding = match self
            .bounded("embedding", self.stores.embedding.embed(query))
            .await
        {
            Ok(embedding) => embedding,
            Err(e) if e.degrades_to_empty() => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };

        let hits = match self
            .bounded(
                "vector",
                self.stores.vector.search(
                    embedding,
                    self.config.query.semantic_limit,
                    self.config.query.score_threshold,
                ),
            )
            .await
        {
            Ok(hits) => hits,
            Err(e) if e.degrades_to_empty() => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };

        Ok(hits.into_iter().map(semantic_item).collect())
    }

    /// Traverse the graph from each extracted entity term, all terms
    /// issued concurrently.
    async fn graph_traversal(&self, query: &str) -> EngineResult<Vec<ResultItem>> {
        let terms = self.extract_entity_terms(query);

        let traversals = terms.iter().map(|term| {
            self.bounded(
                "graph",
                self.stores
                    .graph
                    .neighbors(term, self.config.query.traversal_depth),
            )
        });

        let mut items = Vec::new();
        for result in futures::future::join_all(traversals).await {
            match result {
                Ok(paths) => {
                    items.extend(paths.into_iter().map(|p| graph_item(p, ResultSource::Graph)))
                }
                Err(e) if e.degrades_to_empty() => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(items)
    }

    /// Semantic search and graph traversal concurrently, merged and ranked.
    /// Either branch may fail without failing the other.
    async fn hybrid_retrieval(&self, query: &str) -> EngineResult<(Vec<ResultItem>, f32)> {
        let (semantic, graph) =
            tokio::join!(self.semantic_search(query), self.graph_traversal(query));

        let semantic = semantic.unwrap_or_else(|e| {
            warn!(error = %e, "semantic branch failed during hybrid retrieval");
            vec![]
        });
        let graph = graph.unwrap_or_else(|e| {
            warn!(error = %e, "graph branch failed during hybrid retrieval");
            vec![]
        });

        let semantic_relevance = mean_score(&semantic);
        let graph_relevance = mean_score(&graph);
        let relevance = 0.6 * semantic_relevance + 0.4 * graph_relevance;

        let merged =
            combine_and_rank_results(semantic, graph, self.config.query.hybrid_result_limit);
        Ok((merged, relevance))
    }

    /// Per-entity lookups through the shared cache before the graph store.
    async fn entity_lookup(&self, query: &str) -> EngineResult<Vec<ResultItem>> {
        let terms = self.extract_entity_terms(query);
        let mut items = Vec::new();

        for term in &terms {
            let entity_key = format!("entity_{}", term.to_lowercase());

            if let Some(cached) = self.cache.get(&entity_key).await {
                items.extend(cached.results);
                continue;
            }

            let paths = match self
                .bounded("graph", self.stores.graph.neighbors(term, 1))
                .await
            {
                Ok(paths) => paths,
                Err(e) if e.degrades_to_empty() => continue,
                Err(e) => return Err(e.into()),
            };

            let entity_items: Vec<ResultItem> = paths
                .into_iter()
                .map(|p| graph_item(p, ResultSource::Entity))
                .collect();

            let cache_entry = QueryResult {
                total_results: entity_items.len(),
                relevance_score: mean_score(&entity_items),
                results: entity_items.clone(),
                query_type: QueryType::EntityLookup,
                error: None,
            };
            self.cache
                .put(&entity_key, cache_entry, Some(ENTITY_CACHE_TTL))
                .await;

            items.extend(entity_items);
        }

        Ok(items)
    }

    /// Shortest paths between every pair of extracted entities.
    async fn relationship_analysis(&self, query: &str) -> EngineResult<Vec<ResultItem>> {
        let terms = self.extract_entity_terms(query);
        let mut items = Vec::new();

        for (i, source) in terms.iter().enumerate() {
            for target in terms.iter().skip(i + 1) {
                let paths = match self
                    .bounded(
                        "graph",
                        self.stores.graph.shortest_paths(
                            source,
                            target,
                            self.config.query.relationship_max_hops,
                        ),
                    )
                    .await
                {
                    Ok(paths) => paths,
                    Err(e) if e.degrades_to_empty() => continue,
                    Err(e) => return Err(e.into()),
                };

                items.extend(
                    paths
                        .into_iter()
                        .map(|p| graph_item(p, ResultSource::Relationship)),
                );
            }
        }

        Ok(items)
    }

    /// Semantic, entity, and relationship branches concurrently; every item
    /// is tagged with a fixed reasoning confidence and re-ranked.
    async fn contextual_reasoning(&self, query: &str) -> EngineResult<(Vec<ResultItem>, f32)> {
        let (semantic, entities, relationships) = tokio::join!(
            self.semantic_search(query),
            self.entity_lookup(query),
            self.relationship_analysis(query)
        );

        let mut items = Vec::new();
        for (name, branch) in [
            ("semantic", semantic),
            ("entity", entities),
            ("relationship", relationships),
        ] {
            match branch {
                Ok(branch_items) => items.extend(branch_items),
                Err(e) => {
                    warn!(branch = name, error = %e, "branch failed during contextual reasoning")
                }
            }
        }

        let mut seen = HashSet::new();
        items.retain(|item| seen.insert(item.id.clone()));

        for item in &mut items {
            item.confidence = Some(REASONING_CONFIDENCE);
        }

        items.sort_by(|a, b| {
            let ka = (a.score + REASONING_CONFIDENCE) / 2.0;
            let kb = (b.score + REASONING_CONFIDENCE) / 2.0;
            kb.partial_cmp(&ka).unwrap_or(std::cmp::Ordering::Equal)
        });
        items.truncate(self.config.query.reasoning_result_limit);

        let relevance = items
            .iter()
            .map(|i| (i.score + REASONING_CONFIDENCE) / 2.0)
            .sum::<f32>()
            / items.len().max(1) as f32;

        Ok((items, relevance))
    }

    /// Up to `max_entity_terms` capitalized non-stopword tokens.
    fn extract_entity_terms(&self, query: &str) -> Vec<String> {
        let mut terms = Vec::new();
        for token in query.split_whitespace() {
            let cleaned = token.trim_matches(|c: char| !c.is_alphanumeric());
            if cleaned.len() < 2 || is_stopword(cleaned) {
                continue;
            }
            let term = capitalize(cleaned);
            if !terms.contains(&term) {
                terms.push(term);
            }
            if terms.len() == self.config.query.max_entity_terms {
                break;
            }
        }
        terms
    }

    /// Stable cache key over the canonical serialization of the request.
    fn cache_key(
        &self,
        query: &str,
        query_type: QueryType,
        context: &serde_json::Map<String, serde_json::Value>,
    ) -> String {
        let canonical = serde_json::json!({
            "query": query,
            "query_type": query_type.to_string(),
            "context": context,
        });
        let serialized = canonical.to_string();
        let mut hasher = Sha256::new();
        hasher.update(serialized.as_bytes());
        format!("query_{}", hex::encode(hasher.finalize()))
    }

    /// Base TTL per query type, scaled by result quality.
    fn compute_ttl(query_type: QueryType, relevance_score: f32) -> Duration {
        let base_secs = match query_type {
            QueryType::SemanticSearch => 1800,
            QueryType::GraphTraversal => 3600,
            QueryType::HybridRetrieval => 1800,
            QueryType::EntityLookup => 7200,
            QueryType::RelationshipAnalysis => 3600,
            QueryType::ContextualReasoning => 900,
        };

        let scale = if relevance_score > 0.8 {
            1.5
        } else if relevance_score < 0.3 {
            0.5
        } else {
            1.0
        };

        Duration::from_secs_f64(base_secs as f64 * scale)
    }

    /// Bound a backend call by the configured timeout, if any.
    async fn bounded<T>(
        &self,
        backend: &str,
        fut: impl std::future::Future<Output = Result<T, BackendError>>,
    ) -> Result<T, BackendError> {
        match self.config.backend_timeout() {
            Some(timeout) => match tokio::time::timeout(timeout, fut).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(backend = backend, timeout_ms = timeout.as_millis() as u64, "backend call timed out");
                    Err(BackendError::RequestTimeout {
                        backend: backend.to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                    })
                }
            },
            None => fut.await,
        }
    }

    async fn record_sample(
        &self,
        query_id: Uuid,
        query_type: QueryType,
        execution_time: Duration,
        cache_hit: bool,
        response: &QueryResult,
    ) {
        let partition_stats = self.partitions.stats().await;
        let sample = QueryPerformanceMetrics {
            query_id,
            query_type,
            execution_time,
            cache_hit,
            result_count: response.results.len(),
            relevance_score: response.relevance_score,
            resources: ResourceSnapshot {
                cache_entries: self.cache.len().await,
                cache_max_entries: self.cache.max_entries().await,
                partition_count: partition_stats.partition_count,
            },
            timestamp: Utc::now(),
        };

        let span = tracing::Span::current();
        span.record("cache_hit", cache_hit);
        span.record("result_count", response.results.len());
        span.record("relevance_score", response.relevance_score as f64);
        span.record(
            "execution_time_ms",
            execution_time.as_millis() as u64,
        );

        self.metrics.record(sample).await;
    }
}

fn semantic_item(hit: ScoredPoint) -> ResultItem {
    let content = hit
        .payload
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let metadata = hit
        .payload
        .get("metadata")
        .cloned()
        .unwrap_or(serde_json::Value::Null);

    ResultItem {
        id: hit.id,
        content,
        score: hit.score,
        source: ResultSource::Semantic,
        confidence: None,
        path: None,
        metadata,
    }
}

/// Base score 0.6 plus 0.1 per relationship hop, bonus capped at 0.3.
fn graph_score(path: &TraversalPath) -> f32 {
    0.6 + (0.1 * path.hops() as f32).min(0.3)
}

fn graph_item(path: TraversalPath, source: ResultSource) -> ResultItem {
    let content = path
        .nodes
        .iter()
        .zip(path.relationships.iter().map(Some).chain(std::iter::repeat(None)))
        .map(|(node, rel)| match rel {
            Some(rel) => format!("{node} -[{rel}]-> "),
            None => node.clone(),
        })
        .collect::<String>();

    ResultItem {
        id: format!("path:{}", path.nodes.join("->")),
        content,
        score: graph_score(&path),
        source,
        confidence: None,
        path: Some(path),
        metadata: serde_json::Value::Null,
    }
}

/// Merge semantic and graph results: semantic scores weighted by 0.7, graph
/// items keep their hop-based score, duplicates removed keeping the first
/// occurrence, sorted descending, truncated to the limit.
fn combine_and_rank_results(
    semantic: Vec<ResultItem>,
    graph: Vec<ResultItem>,
    limit: usize,
) -> Vec<ResultItem> {
    let mut merged: Vec<ResultItem> = Vec::with_capacity(semantic.len() + graph.len());

    for mut item in semantic {
        item.score *= 0.7;
        merged.push(item);
    }
    merged.extend(graph);

    let mut seen = HashSet::new();
    merged.retain(|item| seen.insert(item.id.clone()));

    merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    merged.truncate(limit);
    merged
}

fn mean_score(items: &[ResultItem]) -> f32 {
    if items.is_empty() {
        return 0.0;
    }
    items.iter().map(|i| i.score).sum::<f32>() / items.len() as f32
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn is_stopword(word: &str) -> bool {
    const STOPWORDS: &[&str] = &[
        "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with",
        "by", "is", "are", "was", "were", "be", "been", "this", "that", "these", "those",
        "it", "its", "from", "as", "about", "between", "into", "find", "show", "get",
        "all", "any", "what", "which", "who", "whom", "how", "when", "where", "why",
        "does", "do", "did", "related",
    ];
    let lowered = word.to_lowercase();
    STOPWORDS.contains(&lowered.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EvictionStrategy;
    use crate::stores::StoreHandles;

    fn test_engine() -> GraphRagEngine {
        let mut config = EngineConfig::default();
        config.cache.max_entries = 100;
        config.cache.strategy = EvictionStrategy::Lru;
        GraphRagEngine::new(config, StoreHandles::disabled())
    }

    fn item(id: &str, score: f32, source: ResultSource) -> ResultItem {
        ResultItem {
            id: id.to_string(),
            content: id.to_string(),
            score,
            source,
            confidence: None,
            path: None,
            metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn ttl_scales_with_relevance() {
        let ttl = GraphRagEngine::compute_ttl(QueryType::SemanticSearch, 0.9);
        assert_eq!(ttl, Duration::from_secs(2700));

        let ttl = GraphRagEngine::compute_ttl(QueryType::SemanticSearch, 0.2);
        assert_eq!(ttl, Duration::from_secs(900));

        let ttl = GraphRagEngine::compute_ttl(QueryType::SemanticSearch, 0.5);
        assert_eq!(ttl, Duration::from_secs(1800));

        let ttl = GraphRagEngine::compute_ttl(QueryType::EntityLookup, 0.5);
        assert_eq!(ttl, Duration::from_secs(7200));
    }

    #[test]
    fn cache_keys_are_stable_and_distinct() {
        let engine = test_engine();
        let context = serde_json::Map::new();

        let a = engine.cache_key("find Alice", QueryType::EntityLookup, &context);
        let b = engine.cache_key("find Alice", QueryType::EntityLookup, &context);
        assert_eq!(a, b);

        let c = engine.cache_key("find Alice", QueryType::SemanticSearch, &context);
        assert_ne!(a, c);

        let mut other_context = serde_json::Map::new();
        other_context.insert("tenant".to_string(), serde_json::json!("acme"));
        let d = engine.cache_key("find Alice", QueryType::EntityLookup, &other_context);
        assert_ne!(a, d);
    }

    #[test]
    fn entity_terms_skip_stopwords_and_cap_at_limit() {
        let engine = test_engine();

        let terms = engine.extract_entity_terms("find the connection between Alice and Bob");
        assert_eq!(terms, vec!["Connection", "Alice", "Bob"]);

        let terms = engine
            .extract_entity_terms("Alpha Beta Gamma Delta Epsilon Zeta Eta");
        assert_eq!(terms.len(), 5);

        let terms = engine.extract_entity_terms("Alice Alice Alice");
        assert_eq!(terms, vec!["Alice"]);
    }

    #[test]
    fn combine_and_rank_weights_and_dedups() {
        let semantic = vec![item("s1", 1.0, ResultSource::Semantic)];
        let graph = vec![
            item("g1", 0.8, ResultSource::Graph),
            item("s1", 0.6, ResultSource::Graph),
        ];

        let merged = combine_and_rank_results(semantic, graph, 15);

        assert_eq!(merged.len(), 2);
        // Semantic 1.0 * 0.7 = 0.7 sorts below the 0.8 graph result
        assert_eq!(merged[0].id, "g1");
        assert_eq!(merged[1].id, "s1");
        assert_eq!(merged[1].source, ResultSource::Semantic);
        assert!((merged[1].score - 0.7).abs() < 1e-6);
    }

    #[test]
    fn combine_and_rank_is_deterministic_and_bounded() {
        let semantic: Vec<ResultItem> = (0..20)
            .map(|i| item(&format!("s{i}"), 0.9 - i as f32 * 0.01, ResultSource::Semantic))
            .collect();
        let graph: Vec<ResultItem> = (0..20)
            .map(|i| item(&format!("g{i}"), 0.8 - i as f32 * 0.01, ResultSource::Graph))
            .collect();

        let a = combine_and_rank_results(semantic.clone(), graph.clone(), 15);
        let b = combine_and_rank_results(semantic, graph, 15);

        assert_eq!(a.len(), 15);
        let ids_a: Vec<&str> = a.iter().map(|i| i.id.as_str()).collect();
        let ids_b: Vec<&str> = b.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids_a, ids_b);

        let unique: HashSet<&str> = ids_a.iter().copied().collect();
        assert_eq!(unique.len(), 15, "merged ids must be unique");
    }

    #[test]
    fn graph_score_caps_hop_bonus() {
        let short = TraversalPath {
            nodes: vec!["a".into(), "b".into()],
            relationships: vec!["r".into()],
        };
        let long = TraversalPath {
            nodes: vec!["a".into(), "b".into(), "c".into(), "d".into(), "e".into(), "f".into()],
            relationships: vec!["r".into(); 5],
        };

        assert!((graph_score(&short) - 0.7).abs() < 1e-6);
        assert!((graph_score(&long) - 0.9).abs() < 1e-6);
    }

    #[tokio::test]
    async fn disabled_backends_degrade_to_empty_results() {
        let engine = test_engine();
        let context = serde_json::Map::new();

        let response = engine
            .optimized_query("find Alice", QueryType::SemanticSearch, &context)
            .await;

        assert!(response.error.is_none());
        assert!(response.results.is_empty());
        assert_eq!(response.relevance_score, 0.0);
    }

    #[tokio::test]
    async fn error_responses_never_panic_the_caller() {
        let engine = test_engine();
        let context = serde_json::Map::new();

        for query_type in [
            QueryType::SemanticSearch,
            QueryType::GraphTraversal,
            QueryType::HybridRetrieval,
            QueryType::EntityLookup,
            QueryType::RelationshipAnalysis,
            QueryType::ContextualReasoning,
        ] {
            let response = engine
                .optimized_query("connect Alice and Bob", query_type, &context)
                .await;
            assert_eq!(response.query_type, query_type);
        }
    }
}
