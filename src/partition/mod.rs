//! Graph partitioning for scalable traversal
//!
//! Splits a node/edge graph into bounded-size partitions via connected
//! component discovery with a size-bounded BFS, chunking any component that
//! reaches the bound. Each partition carries its internal edges, a centroid
//! embedding for partition-level similarity routing, and a byte-size
//! estimate. A node→partition index supports O(1) lookups.

use crate::errors::{PartitionError, PartitionResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Estimated memory footprint per node, in bytes
const NODE_SIZE_ESTIMATE: usize = 1000;
/// Estimated memory footprint per edge, in bytes
const EDGE_SIZE_ESTIMATE: usize = 100;

/// A node in the source graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    /// Node identifier, unique within one graph
    pub id: String,
    /// Optional embedding vector used for centroid computation
    pub embedding: Option<Vec<f32>>,
    /// Opaque node properties
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl GraphNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            embedding: None,
            properties: serde_json::Map::new(),
        }
    }

    pub fn with_embedding(id: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            embedding: Some(embedding),
            properties: serde_json::Map::new(),
        }
    }
}

/// An edge in the source graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    /// Relationship label carried through to traversal results
    pub relationship: String,
    pub weight: f64,
}

impl GraphEdge {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        relationship: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relationship: relationship.into(),
            weight: 1.0,
        }
    }
}

/// A bounded-size subgraph produced by one partitioning run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphPartition {
    pub id: Uuid,
    /// Member node identifiers; disjoint across one run's partitions
    pub nodes: HashSet<String>,
    /// Edges with both endpoints inside `nodes`
    pub edges: Vec<GraphEdge>,
    /// Mean embedding of member nodes, zero vector when none carry one
    pub centroid: Vec<f32>,
    /// Linear footprint estimate, not a measured size
    pub estimated_bytes: usize,
    pub last_optimized: DateTime<Utc>,
}

/// Summary statistics for the current partition set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionStats {
    pub partition_count: usize,
    pub total_nodes: usize,
    pub total_edges: usize,
    pub largest_partition: usize,
    pub estimated_total_bytes: usize,
}

/// Splits graphs into bounded-size partitions and indexes the result
pub struct GraphPartitionManager {
    max_partition_size: usize,
    embedding_dim: usize,
    partitions: RwLock<Vec<Arc<GraphPartition>>>,
    node_index: DashMap<String, Uuid>,
}

impl GraphPartitionManager {
    pub fn new(max_partition_size: usize, embedding_dim: usize) -> Self {
        Self {
            max_partition_size,
            embedding_dim,
            partitions: RwLock::new(Vec::new()),
            node_index: DashMap::new(),
        }
    }

    /// Partition a graph into components of at most `max_partition_size`
    /// nodes, replacing any previous partition set.
    ///
    /// Edges referencing unknown nodes are skipped as data-quality issues.
    /// Components are discovered with a BFS that stops enqueuing at the size
    /// bound; a component that reaches the bound is split by contiguous
    /// chunking, so every node lands in exactly one partition.
    pub async fn partition_graph(
        &self,
        nodes: &[GraphNode],
        edges: &[GraphEdge],
    ) -> PartitionResult<Vec<Arc<GraphPartition>>> {
        if nodes.is_empty() {
            return Err(PartitionError::EmptyGraph);
        }
        if self.max_partition_size == 0 {
            return Err(PartitionError::InvalidBound { bound: 0 });
        }

        let span = crate::logging::partition_span(nodes.len(), edges.len());
        let new_partitions = span.in_scope(|| {
            let node_map: HashMap<&str, &GraphNode> =
                nodes.iter().map(|n| (n.id.as_str(), n)).collect();

            let mut new_partitions = Vec::new();

            if nodes.len() <= self.max_partition_size {
                new_partitions.push(Arc::new(self.build_partition(
                    nodes.iter().map(|n| n.id.clone()).collect(),
                    edges,
                    &node_map,
                )));
                return new_partitions;
            }

            let adjacency = self.build_adjacency(nodes, edges, &node_map);
            let mut processed: HashSet<String> = HashSet::new();

            for node in nodes {
                if processed.contains(&node.id) {
                    continue;
                }

                let component = self.bounded_bfs(&node.id, &adjacency, &processed);

                if component.len() >= self.max_partition_size {
                    // Bound reached means the BFS was likely truncated; chunk
                    // the discovered node list instead of emitting it whole.
                    for chunk in component.chunks(self.max_partition_size) {
                        new_partitions.push(Arc::new(self.build_partition(
                            chunk.iter().cloned().collect(),
                            edges,
                            &node_map,
                        )));
                    }
                } else {
                    new_partitions.push(Arc::new(self.build_partition(
                        component.iter().cloned().collect(),
                        edges,
                        &node_map,
                    )));
                }

                processed.extend(component);
            }

            new_partitions
        });

        self.node_index.clear();
        for partition in &new_partitions {
            for node_id in &partition.nodes {
                self.node_index.insert(node_id.clone(), partition.id);
            }
        }

        let mut partitions = self.partitions.write().await;
        *partitions = new_partitions.clone();

        span.record("partitions", new_partitions.len());
        info!(
            partitions = new_partitions.len(),
            nodes = nodes.len(),
            "graph partitioning completed"
        );

        Ok(new_partitions)
    }

    /// O(1) lookup of the partition containing a node.
    pub fn lookup_partition(&self, node_id: &str) -> Option<Uuid> {
        self.node_index.get(node_id).map(|entry| *entry.value())
    }

    pub async fn get_partition(&self, id: Uuid) -> Option<Arc<GraphPartition>> {
        self.partitions
            .read()
            .await
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    pub async fn stats(&self) -> PartitionStats {
        let partitions = self.partitions.read().await;
        PartitionStats {
            partition_count: partitions.len(),
            total_nodes: partitions.iter().map(|p| p.nodes.len()).sum(),
            total_edges: partitions.iter().map(|p| p.edges.len()).sum(),
            largest_partition: partitions.iter().map(|p| p.nodes.len()).max().unwrap_or(0),
            estimated_total_bytes: partitions.iter().map(|p| p.estimated_bytes).sum(),
        }
    }

    /// Undirected adjacency list; malformed edges are dropped with a warning.
    fn build_adjacency(
        &self,
        nodes: &[GraphNode],
        edges: &[GraphEdge],
        node_map: &HashMap<&str, &GraphNode>,
    ) -> HashMap<String, Vec<String>> {
        let mut adjacency: HashMap<String, Vec<String>> = nodes
            .iter()
            .map(|n| (n.id.clone(), Vec::new()))
            .collect();

        for edge in edges {
            if !node_map.contains_key(edge.source.as_str())
                || !node_map.contains_key(edge.target.as_str())
            {
                warn!(
                    source = %edge.source,
                    target = %edge.target,
                    "skipping edge referencing unknown node"
                );
                continue;
            }
            if let Some(neighbors) = adjacency.get_mut(&edge.source) {
                neighbors.push(edge.target.clone());
            }
            if let Some(neighbors) = adjacency.get_mut(&edge.target) {
                neighbors.push(edge.source.clone());
            }
        }

        adjacency
    }

    /// BFS from `start`, stopping enqueuing once the component reaches the
    /// size bound. Returns discovery order so chunking stays deterministic.
    fn bounded_bfs(
        &self,
        start: &str,
        adjacency: &HashMap<String, Vec<String>>,
        processed: &HashSet<String>,
    ) -> Vec<String> {
        let mut component = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue = VecDeque::new();

        queue.push_back(start.to_string());
        visited.insert(start.to_string());

        while let Some(node_id) = queue.pop_front() {
            component.push(node_id.clone());

            if component.len() + queue.len() >= self.max_partition_size {
                // Drain whatever is already queued, but stop growing.
                while let Some(queued) = queue.pop_front() {
                    component.push(queued);
                }
                break;
            }

            if let Some(neighbors) = adjacency.get(&node_id) {
                for neighbor in neighbors {
                    if component.len() + queue.len() >= self.max_partition_size {
                        break;
                    }
                    if !visited.contains(neighbor) && !processed.contains(neighbor) {
                        visited.insert(neighbor.clone());
                        queue.push_back(neighbor.clone());
                    }
                }
            }
        }

        debug!(start = start, size = component.len(), "component discovered");
        component
    }

    fn build_partition(
        &self,
        node_ids: HashSet<String>,
        all_edges: &[GraphEdge],
        node_map: &HashMap<&str, &GraphNode>,
    ) -> GraphPartition {
        let edges: Vec<GraphEdge> = all_edges
            .iter()
            .filter(|e| node_ids.contains(&e.source) && node_ids.contains(&e.target))
            .cloned()
            .collect();

        let centroid = self.compute_centroid(&node_ids, node_map);
        let estimated_bytes =
            node_ids.len() * NODE_SIZE_ESTIMATE + edges.len() * EDGE_SIZE_ESTIMATE;

        GraphPartition {
            id: Uuid::new_v4(),
            nodes: node_ids,
            edges,
            centroid,
            estimated_bytes,
            last_optimized: Utc::now(),
        }
    }

    /// Mean of member embeddings; a zero vector of the configured dimension
    /// when no member carries one.
    fn compute_centroid(
        &self,
        node_ids: &HashSet<String>,
        node_map: &HashMap<&str, &GraphNode>,
    ) -> Vec<f32> {
        let embeddings: Vec<&Vec<f32>> = node_ids
            .iter()
            .filter_map(|id| node_map.get(id.as_str()))
            .filter_map(|n| n.embedding.as_ref())
            .collect();

        if embeddings.is_empty() {
            return vec![0.0; self.embedding_dim];
        }

        let dim = embeddings[0].len();
        let mut centroid = vec![0.0f32; dim];
        for embedding in &embeddings {
            for (acc, value) in centroid.iter_mut().zip(embedding.iter()) {
                *acc += value;
            }
        }
        let count = embeddings.len() as f32;
        for value in &mut centroid {
            *value /= count;
        }
        centroid
    }
}
