//! End-to-end tests for the GraphRAG engine
//!
//! Exercises the full query path against in-memory backends: cache-first
//! entity lookups, hybrid retrieval with a degraded graph backend, and the
//! self-optimization feedback loop.

use async_trait::async_trait;
use graphrag_engine::cache::EvictionStrategy;
use graphrag_engine::config::EngineConfig;
use graphrag_engine::engine::{GraphRagEngine, QueryType};
use graphrag_engine::errors::{BackendError, BackendResult};
use graphrag_engine::stores::{
    EmbeddingModel, GraphStore, HashEmbeddingModel, InMemoryGraphStore, InMemoryVectorStore,
    ScoredPoint, StoreHandles, TraversalPath, VectorStore,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Graph store wrapper counting how often the backend is contacted
struct CountingGraphStore {
    inner: InMemoryGraphStore,
    neighbor_calls: AtomicUsize,
    path_calls: AtomicUsize,
}

impl CountingGraphStore {
    fn new(inner: InMemoryGraphStore) -> Self {
        Self {
            inner,
            neighbor_calls: AtomicUsize::new(0),
            path_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl GraphStore for CountingGraphStore {
    async fn neighbors(&self, entity: &str, max_hops: usize) -> BackendResult<Vec<TraversalPath>> {
        self.neighbor_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.neighbors(entity, max_hops).await
    }

    async fn shortest_paths(
        &self,
        source: &str,
        target: &str,
        max_hops: usize,
    ) -> BackendResult<Vec<TraversalPath>> {
        self.path_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.shortest_paths(source, target, max_hops).await
    }
}

/// Graph store that always fails, simulating a broken backend
struct FailingGraphStore;

#[async_trait]
impl GraphStore for FailingGraphStore {
    async fn neighbors(&self, entity: &str, _max_hops: usize) -> BackendResult<Vec<TraversalPath>> {
        Err(BackendError::TraversalFailed {
            entity: entity.to_string(),
            reason: "simulated outage".to_string(),
        })
    }

    async fn shortest_paths(
        &self,
        source: &str,
        _target: &str,
        _max_hops: usize,
    ) -> BackendResult<Vec<TraversalPath>> {
        Err(BackendError::TraversalFailed {
            entity: source.to_string(),
            reason: "simulated outage".to_string(),
        })
    }
}

fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.cache.max_entries = 100;
    config.cache.strategy = EvictionStrategy::Lru;
    config.partition.embedding_dim = 16;
    config
}

async fn seeded_vector_store(model: &HashEmbeddingModel, docs: &[(&str, &str)]) -> InMemoryVectorStore {
    let store = InMemoryVectorStore::new();
    for (id, content) in docs {
        let embedding = model.embed(content).await.unwrap();
        store
            .insert(
                *id,
                embedding,
                json!({"content": content, "metadata": {"source": "test"}}),
            )
            .await;
    }
    store
}

#[tokio::test]
async fn entity_lookup_hits_cache_on_second_call() {
    let graph = InMemoryGraphStore::new();
    graph.add_relationship("Alice", "Bob", "knows").await;
    let counting = Arc::new(CountingGraphStore::new(graph));

    let stores = StoreHandles::new(
        Arc::new(InMemoryVectorStore::new()),
        counting.clone(),
        Arc::new(HashEmbeddingModel::new(16)),
    );
    let engine = GraphRagEngine::new(test_config(), stores);
    let context = serde_json::Map::new();

    let first = engine
        .optimized_query("find Alice", QueryType::EntityLookup, &context)
        .await;
    assert!(first.error.is_none());
    assert_eq!(first.total_results, 1);
    assert_eq!(counting.neighbor_calls.load(Ordering::SeqCst), 1);

    let second = engine
        .optimized_query("find Alice", QueryType::EntityLookup, &context)
        .await;

    // Second identical call resolves from cache without store contact
    assert_eq!(counting.neighbor_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap(),
        "cached response must be identical"
    );

    let stats = engine.get_performance_stats().await;
    assert_eq!(stats.queries.total_queries, 2);
    assert!((stats.queries.cache_hit_rate - 0.5).abs() < 1e-9);
}

#[tokio::test]
async fn hybrid_survives_graph_store_outage() {
    let model = HashEmbeddingModel::new(16);
    let vector = seeded_vector_store(
        &model,
        &[
            ("doc1", "Alice leads the retrieval team"),
            ("doc2", "Bob maintains the graph database"),
        ],
    )
    .await;

    let stores = StoreHandles::new(
        Arc::new(vector),
        Arc::new(FailingGraphStore),
        Arc::new(HashEmbeddingModel::new(16)),
    );
    let engine = GraphRagEngine::new(test_config(), stores);
    let context = serde_json::Map::new();

    let response = engine
        .optimized_query(
            "Alice leads the retrieval team",
            QueryType::HybridRetrieval,
            &context,
        )
        .await;

    // Partial success: semantic branch results survive, no error surfaced
    assert!(response.error.is_none());
    assert!(!response.results.is_empty());
    assert!(response
        .results
        .iter()
        .all(|item| item.path.is_none()), "no graph results expected");
}

#[tokio::test]
async fn hybrid_merges_semantic_and_graph_branches() {
    let model = HashEmbeddingModel::new(16);
    let vector = seeded_vector_store(&model, &[("doc1", "Alice architecture notes")]).await;

    let graph = InMemoryGraphStore::new();
    graph.add_relationship("Alice", "Bob", "works_with").await;

    let stores = StoreHandles::new(
        Arc::new(vector),
        Arc::new(graph),
        Arc::new(HashEmbeddingModel::new(16)),
    );
    let engine = GraphRagEngine::new(test_config(), stores);
    let context = serde_json::Map::new();

    let response = engine
        .optimized_query(
            "Alice architecture notes",
            QueryType::HybridRetrieval,
            &context,
        )
        .await;

    assert!(response.error.is_none());
    let has_semantic = response.results.iter().any(|i| i.path.is_none());
    let has_graph = response.results.iter().any(|i| i.path.is_some());
    assert!(has_semantic, "semantic branch contributed");
    assert!(has_graph, "graph branch contributed");
    assert!(response.relevance_score > 0.0);
}

#[tokio::test]
async fn relationship_analysis_finds_paths_between_entities() {
    let graph = InMemoryGraphStore::new();
    graph.add_relationship("Alice", "Carol", "mentors").await;
    graph.add_relationship("Carol", "Bob", "mentors").await;

    let stores = StoreHandles::new(
        Arc::new(InMemoryVectorStore::new()),
        Arc::new(graph),
        Arc::new(HashEmbeddingModel::new(16)),
    );
    let engine = GraphRagEngine::new(test_config(), stores);
    let context = serde_json::Map::new();

    let response = engine
        .optimized_query(
            "how are Alice and Bob connected",
            QueryType::RelationshipAnalysis,
            &context,
        )
        .await;

    assert!(response.error.is_none());
    assert_eq!(response.total_results, 1);
    let path = response.results[0].path.as_ref().unwrap();
    assert_eq!(path.nodes, vec!["Alice", "Carol", "Bob"]);
    assert_eq!(path.hops(), 2);
}

#[tokio::test]
async fn contextual_reasoning_tags_confidence_and_ranks() {
    let model = HashEmbeddingModel::new(16);
    let vector = seeded_vector_store(&model, &[("doc1", "Alice project history")]).await;

    let graph = InMemoryGraphStore::new();
    graph.add_relationship("Alice", "Bob", "reviews").await;

    let stores = StoreHandles::new(
        Arc::new(vector),
        Arc::new(graph),
        Arc::new(HashEmbeddingModel::new(16)),
    );
    let engine = GraphRagEngine::new(test_config(), stores);
    let context = serde_json::Map::new();

    let response = engine
        .optimized_query(
            "Alice project history",
            QueryType::ContextualReasoning,
            &context,
        )
        .await;

    assert!(response.error.is_none());
    assert!(!response.results.is_empty());
    assert!(response.results.len() <= 20);
    for item in &response.results {
        assert_eq!(item.confidence, Some(0.8));
    }
    for pair in response.results.windows(2) {
        assert!(pair[0].score >= pair[1].score, "results sorted descending");
    }
}

#[tokio::test]
async fn optimization_doubles_cache_under_low_hit_rate() {
    let engine = GraphRagEngine::new(test_config(), StoreHandles::disabled());
    let context = serde_json::Map::new();

    // Distinct queries miss the cache every time
    for i in 0..10 {
        engine
            .optimized_query(&format!("query {i}"), QueryType::SemanticSearch, &context)
            .await;
    }

    let report = engine.optimize_performance().await;
    assert_eq!(report.analyzed_samples, 10);
    assert!(report.cache_hit_rate.unwrap() < 0.6);
    assert!(report.cache_resized);
    assert_eq!(report.new_cache_max_entries, Some(200));

    let stats = engine.get_performance_stats().await;
    assert_eq!(stats.cache.max_entries, 200);
}

#[tokio::test]
async fn optimization_only_recommends_shrinking_under_high_hit_rate() {
    let graph = InMemoryGraphStore::new();
    graph.add_relationship("Alice", "Bob", "knows").await;

    let stores = StoreHandles::new(
        Arc::new(InMemoryVectorStore::new()),
        Arc::new(graph),
        Arc::new(HashEmbeddingModel::new(16)),
    );
    let engine = GraphRagEngine::new(test_config(), stores);
    let context = serde_json::Map::new();

    // One miss followed by many hits on the same key
    for _ in 0..20 {
        engine
            .optimized_query("find Alice", QueryType::EntityLookup, &context)
            .await;
    }

    let report = engine.optimize_performance().await;
    assert!(report.cache_hit_rate.unwrap() > 0.9);
    assert!(!report.cache_resized);
    assert!(report
        .recommendations
        .iter()
        .any(|r| r.contains("shrinking")));

    let stats = engine.get_performance_stats().await;
    assert_eq!(stats.cache.max_entries, 100);
}

#[tokio::test]
async fn cache_growth_respects_hard_ceiling() {
    let mut config = test_config();
    config.cache.max_entries = 40_000;
    let engine = GraphRagEngine::new(config, StoreHandles::disabled());
    let context = serde_json::Map::new();

    for i in 0..5 {
        engine
            .optimized_query(&format!("query {i}"), QueryType::SemanticSearch, &context)
            .await;
    }

    let report = engine.optimize_performance().await;
    assert!(report.cache_resized);
    assert_eq!(report.new_cache_max_entries, Some(50_000));

    // A second pass cannot grow past the ceiling
    for i in 5..10 {
        engine
            .optimized_query(&format!("query {i}"), QueryType::SemanticSearch, &context)
            .await;
    }
    let report = engine.optimize_performance().await;
    assert!(!report.cache_resized);
}

#[tokio::test]
async fn backend_timeout_degrades_to_empty_branch() {
    /// Vector store that never responds within a short timeout
    struct StalledVectorStore;

    #[async_trait]
    impl VectorStore for StalledVectorStore {
        async fn search(
            &self,
            _vector: Vec<f32>,
            _limit: usize,
            _score_threshold: f32,
        ) -> BackendResult<Vec<ScoredPoint>> {
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            Ok(vec![])
        }
    }

    let mut config = test_config();
    config.query.backend_timeout_ms = Some(50);

    let stores = StoreHandles::new(
        Arc::new(StalledVectorStore),
        Arc::new(InMemoryGraphStore::new()),
        Arc::new(HashEmbeddingModel::new(16)),
    );
    let engine = GraphRagEngine::new(config, stores);
    let context = serde_json::Map::new();

    let start = std::time::Instant::now();
    let response = engine
        .optimized_query("anything at all", QueryType::SemanticSearch, &context)
        .await;

    assert!(start.elapsed() < std::time::Duration::from_secs(5));
    assert!(response.error.is_none());
    assert!(response.results.is_empty());
}
