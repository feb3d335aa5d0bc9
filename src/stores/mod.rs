//! External store interfaces
//!
//! The engine consumes three collaborators through narrow async traits: a
//! vector similarity index, a graph store with traversal primitives, and an
//! embedding model. Deployments without one of these wire in the `Disabled*`
//! implementation, which reports the backend as unavailable; dispatch then
//! degrades that branch to an empty result set instead of failing the query.
//!
//! In-memory reference implementations back the test suite and small
//! single-process deployments.

use crate::errors::{BackendError, BackendResult};
use async_trait::async_trait;
use dashmap::DashMap;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// One vector search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: String,
    /// Opaque payload with at least a `content` string and a `metadata` map
    pub payload: serde_json::Value,
    pub score: f32,
}

/// One traversal result: a node path and the relationship labels along it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalPath {
    pub nodes: Vec<String>,
    pub relationships: Vec<String>,
}

impl TraversalPath {
    /// Number of relationship hops in the path.
    pub fn hops(&self) -> usize {
        self.relationships.len()
    }
}

/// Vector similarity index
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Top-`limit` most similar points above `score_threshold`.
    async fn search(
        &self,
        vector: Vec<f32>,
        limit: usize,
        score_threshold: f32,
    ) -> BackendResult<Vec<ScoredPoint>>;
}

/// Knowledge-graph traversal primitives
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// All paths from `entity` up to `max_hops` hops away.
    async fn neighbors(&self, entity: &str, max_hops: usize) -> BackendResult<Vec<TraversalPath>>;

    /// Shortest paths between two named entities, bounded by `max_hops`.
    async fn shortest_paths(
        &self,
        source: &str,
        target: &str,
        max_hops: usize,
    ) -> BackendResult<Vec<TraversalPath>>;
}

/// Text embedding model
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    async fn embed(&self, text: &str) -> BackendResult<Vec<f32>>;

    /// Embedding dimension, fixed per deployment.
    fn dimension(&self) -> usize;
}

/// Vector store stand-in for deployments without a vector index
pub struct DisabledVectorStore;

#[async_trait]
impl VectorStore for DisabledVectorStore {
    async fn search(
        &self,
        _vector: Vec<f32>,
        _limit: usize,
        _score_threshold: f32,
    ) -> BackendResult<Vec<ScoredPoint>> {
        Err(BackendError::Unavailable {
            backend: "vector".to_string(),
        })
    }
}

/// Graph store stand-in for deployments without a graph database
pub struct DisabledGraphStore;

#[async_trait]
impl GraphStore for DisabledGraphStore {
    async fn neighbors(&self, _entity: &str, _max_hops: usize) -> BackendResult<Vec<TraversalPath>> {
        Err(BackendError::Unavailable {
            backend: "graph".to_string(),
        })
    }

    async fn shortest_paths(
        &self,
        _source: &str,
        _target: &str,
        _max_hops: usize,
    ) -> BackendResult<Vec<TraversalPath>> {
        Err(BackendError::Unavailable {
            backend: "graph".to_string(),
        })
    }
}

/// Embedding model stand-in
pub struct DisabledEmbeddingModel;

#[async_trait]
impl EmbeddingModel for DisabledEmbeddingModel {
    async fn embed(&self, _text: &str) -> BackendResult<Vec<f32>> {
        Err(BackendError::Unavailable {
            backend: "embedding".to_string(),
        })
    }

    fn dimension(&self) -> usize {
        0
    }
}

/// In-memory vector store using cosine similarity
pub struct InMemoryVectorStore {
    points: RwLock<Vec<StoredPoint>>,
}

struct StoredPoint {
    id: String,
    embedding: Vec<f32>,
    payload: serde_json::Value,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            points: RwLock::new(Vec::new()),
        }
    }

    pub async fn insert(&self, id: impl Into<String>, embedding: Vec<f32>, payload: serde_json::Value) {
        self.points.write().await.push(StoredPoint {
            id: id.into(),
            embedding,
            payload,
        });
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            0.0
        } else {
            dot / (norm_a * norm_b)
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn search(
        &self,
        vector: Vec<f32>,
        limit: usize,
        score_threshold: f32,
    ) -> BackendResult<Vec<ScoredPoint>> {
        let points = self.points.read().await;
        let mut hits: Vec<ScoredPoint> = points
            .iter()
            .map(|p| ScoredPoint {
                id: p.id.clone(),
                payload: p.payload.clone(),
                score: Self::cosine_similarity(&vector, &p.embedding),
            })
            .filter(|hit| hit.score >= score_threshold)
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }
}

/// In-memory graph store backed by a directed petgraph with a concurrent
/// entity index
pub struct InMemoryGraphStore {
    graph: RwLock<DiGraph<String, String>>,
    entity_index: DashMap<String, NodeIndex>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self {
            graph: RwLock::new(DiGraph::new()),
            entity_index: DashMap::new(),
        }
    }

    pub async fn add_entity(&self, id: impl Into<String>) {
        let mut graph = self.graph.write().await;
        self.ensure_node(&mut graph, id.into());
    }

    /// Add a relationship, creating both endpoints as needed.
    pub async fn add_relationship(
        &self,
        source: impl Into<String>,
        target: impl Into<String>,
        relationship: impl Into<String>,
    ) {
        let mut graph = self.graph.write().await;
        let source_idx = self.ensure_node(&mut graph, source.into());
        let target_idx = self.ensure_node(&mut graph, target.into());
        graph.add_edge(source_idx, target_idx, relationship.into());
    }

    fn ensure_node(&self, graph: &mut DiGraph<String, String>, id: String) -> NodeIndex {
        if let Some(entry) = self.entity_index.get(&id) {
            return *entry.value();
        }
        let index = graph.add_node(id.clone());
        self.entity_index.insert(id, index);
        index
    }

    /// BFS over outgoing and incoming edges, collecting the path to every
    /// node reached within the hop bound.
    fn collect_paths(
        graph: &DiGraph<String, String>,
        start: NodeIndex,
        max_hops: usize,
    ) -> Vec<TraversalPath> {
        use petgraph::visit::EdgeRef;

        let mut paths = Vec::new();
        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut queue: VecDeque<(NodeIndex, TraversalPath)> = VecDeque::new();

        visited.insert(start);
        queue.push_back((
            start,
            TraversalPath {
                nodes: vec![graph[start].clone()],
                relationships: vec![],
            },
        ));

        while let Some((node, path)) = queue.pop_front() {
            if path.hops() >= max_hops {
                continue;
            }
            let mut extend = |neighbor: NodeIndex, label: &str| {
                if visited.insert(neighbor) {
                    let mut next = path.clone();
                    next.nodes.push(graph[neighbor].clone());
                    next.relationships.push(label.to_string());
                    paths.push(next.clone());
                    queue.push_back((neighbor, next));
                }
            };

            for edge in graph.edges(node) {
                extend(edge.target(), edge.weight());
            }
            for edge in graph.edges_directed(node, petgraph::Direction::Incoming) {
                extend(edge.source(), edge.weight());
            }
        }

        paths
    }
}

impl Default for InMemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn neighbors(&self, entity: &str, max_hops: usize) -> BackendResult<Vec<TraversalPath>> {
        let start = match self.entity_index.get(entity) {
            Some(entry) => *entry.value(),
            None => {
                debug!(entity = entity, "entity not present in graph store");
                return Ok(vec![]);
            }
        };

        let graph = self.graph.read().await;
        Ok(Self::collect_paths(&graph, start, max_hops))
    }

    async fn shortest_paths(
        &self,
        source: &str,
        target: &str,
        max_hops: usize,
    ) -> BackendResult<Vec<TraversalPath>> {
        let start = match self.entity_index.get(source) {
            Some(entry) => *entry.value(),
            None => return Ok(vec![]),
        };
        if !self.entity_index.contains_key(target) {
            return Ok(vec![]);
        }

        let graph = self.graph.read().await;
        // BFS discovery order yields a shortest path first; keep only paths
        // ending at the target with the minimum hop count.
        let reaching: Vec<TraversalPath> = Self::collect_paths(&graph, start, max_hops)
            .into_iter()
            .filter(|p| p.nodes.last().map(String::as_str) == Some(target))
            .collect();

        let min_hops = match reaching.iter().map(TraversalPath::hops).min() {
            Some(min) => min,
            None => return Ok(vec![]),
        };

        Ok(reaching
            .into_iter()
            .filter(|p| p.hops() == min_hops)
            .collect())
    }
}

/// Deterministic embedding model folding bytes into a fixed-size vector
/// with L2 normalization. Useful for tests and environments without a
/// real model.
pub struct HashEmbeddingModel {
    dimension: usize,
}

impl HashEmbeddingModel {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl EmbeddingModel for HashEmbeddingModel {
    async fn embed(&self, text: &str) -> BackendResult<Vec<f32>> {
        if self.dimension == 0 {
            return Err(BackendError::EmbeddingFailed {
                reason: "zero embedding dimension".to_string(),
            });
        }

        let mut embedding = vec![0.0f32; self.dimension];
        for (i, byte) in text.bytes().enumerate() {
            embedding[i % self.dimension] += byte as f32 / 255.0;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut embedding {
                *x /= norm;
            }
        }

        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Convenience bundle of store handles consumed by the engine
#[derive(Clone)]
pub struct StoreHandles {
    pub vector: Arc<dyn VectorStore>,
    pub graph: Arc<dyn GraphStore>,
    pub embedding: Arc<dyn EmbeddingModel>,
}

impl StoreHandles {
    pub fn new(
        vector: Arc<dyn VectorStore>,
        graph: Arc<dyn GraphStore>,
        embedding: Arc<dyn EmbeddingModel>,
    ) -> Self {
        Self {
            vector,
            graph,
            embedding,
        }
    }

    /// All backends disabled; every query degrades to empty results.
    pub fn disabled() -> Self {
        Self {
            vector: Arc::new(DisabledVectorStore),
            graph: Arc::new(DisabledGraphStore),
            embedding: Arc::new(DisabledEmbeddingModel),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn vector_store_ranks_by_similarity() {
        let store = InMemoryVectorStore::new();
        store
            .insert("exact", vec![1.0, 0.0], json!({"content": "exact match"}))
            .await;
        store
            .insert("close", vec![0.9, 0.1], json!({"content": "close match"}))
            .await;
        store
            .insert("far", vec![0.0, 1.0], json!({"content": "unrelated"}))
            .await;

        let hits = store.search(vec![1.0, 0.0], 10, 0.5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "exact");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn vector_store_applies_threshold_and_limit() {
        let store = InMemoryVectorStore::new();
        for i in 0..10 {
            store
                .insert(format!("p{i}"), vec![1.0, i as f32 / 10.0], json!({}))
                .await;
        }

        let hits = store.search(vec![1.0, 0.0], 3, 0.0).await.unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[tokio::test]
    async fn graph_store_traverses_within_hop_bound() {
        let store = InMemoryGraphStore::new();
        store.add_relationship("a", "b", "knows").await;
        store.add_relationship("b", "c", "works_with").await;
        store.add_relationship("c", "d", "manages").await;

        let paths = store.neighbors("a", 2).await.unwrap();
        let reached: HashSet<&str> = paths
            .iter()
            .filter_map(|p| p.nodes.last().map(String::as_str))
            .collect();

        assert!(reached.contains("b"));
        assert!(reached.contains("c"));
        assert!(!reached.contains("d"), "d is 3 hops away");
    }

    #[tokio::test]
    async fn graph_store_traverses_incoming_edges() {
        let store = InMemoryGraphStore::new();
        store.add_relationship("parent", "child", "owns").await;

        let paths = store.neighbors("child", 1).await.unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].nodes, vec!["child".to_string(), "parent".to_string()]);
    }

    #[tokio::test]
    async fn shortest_paths_respects_hop_bound() {
        let store = InMemoryGraphStore::new();
        store.add_relationship("a", "b", "r1").await;
        store.add_relationship("b", "c", "r2").await;
        store.add_relationship("c", "d", "r3").await;
        store.add_relationship("d", "e", "r4").await;

        let paths = store.shortest_paths("a", "c", 3).await.unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].hops(), 2);

        let too_far = store.shortest_paths("a", "e", 3).await.unwrap();
        assert!(too_far.is_empty());
    }

    #[tokio::test]
    async fn unknown_entities_yield_empty_results() {
        let store = InMemoryGraphStore::new();
        store.add_relationship("a", "b", "r").await;

        assert!(store.neighbors("ghost", 2).await.unwrap().is_empty());
        assert!(store.shortest_paths("a", "ghost", 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn hash_embeddings_are_deterministic_and_normalized() {
        let model = HashEmbeddingModel::new(16);
        let a = model.embed("retrieval engine").await.unwrap();
        let b = model.embed("retrieval engine").await.unwrap();
        assert_eq!(a, b);

        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert_eq!(model.dimension(), 16);
    }

    #[test]
    fn disabled_backends_report_unavailable() {
        let stores = StoreHandles::disabled();

        assert!(matches!(
            tokio_test::block_on(stores.vector.search(vec![1.0], 5, 0.0)),
            Err(BackendError::Unavailable { .. })
        ));
        assert!(matches!(
            tokio_test::block_on(stores.graph.neighbors("x", 1)),
            Err(BackendError::Unavailable { .. })
        ));
        assert!(matches!(
            tokio_test::block_on(stores.embedding.embed("x")),
            Err(BackendError::Unavailable { .. })
        ));
    }
}
