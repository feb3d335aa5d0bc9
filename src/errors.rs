//! Error types and handling for the GraphRAG engine
//!
//! Error taxonomy for:
//! - Cache operations and eviction
//! - Graph partitioning
//! - Query dispatch and result merging
//! - External store backends (vector, graph, embedding)
//! - Configuration loading

use thiserror::Error;

/// Main error type for the GraphRAG engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("partition error: {0}")]
    Partition(#[from] PartitionError),

    #[error("query error: {0}")]
    Query(#[from] QueryError),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("unknown error: {0}")]
    Unknown(String),
}

/// Cache-specific errors
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache key not found: {key}")]
    KeyNotFound { key: String },

    #[error("eviction failed: strategy={strategy}, reason={reason}")]
    EvictionFailed { strategy: String, reason: String },

    #[error("cache serialization failed: {reason}")]
    SerializationFailed { reason: String },
}

/// Graph partitioning errors
#[derive(Error, Debug)]
pub enum PartitionError {
    #[error("empty graph: nothing to partition")]
    EmptyGraph,

    #[error("invalid partition bound: {bound}")]
    InvalidBound { bound: usize },

    #[error("partition not found for node: {node_id}")]
    PartitionNotFound { node_id: String },
}

/// Query dispatch and merging errors
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("query dispatch failed: query_type={query_type}, error={error}")]
    DispatchFailed { query_type: String, error: String },

    #[error("result merging failed: {reason}")]
    MergeFailed { reason: String },

    #[error("query timed out: query_type={query_type}, timeout_ms={timeout_ms}")]
    Timeout { query_type: String, timeout_ms: u64 },

    #[error("invalid query: {reason}")]
    InvalidQuery { reason: String },
}

/// External store backend errors
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("backend unavailable: {backend}")]
    Unavailable { backend: String },

    #[error("vector search failed: {reason}")]
    VectorSearchFailed { reason: String },

    #[error("graph traversal failed: entity={entity}, reason={reason}")]
    TraversalFailed { entity: String, reason: String },

    #[error("embedding failed: {reason}")]
    EmbeddingFailed { reason: String },

    #[error("backend request timed out: backend={backend}, timeout_ms={timeout_ms}")]
    RequestTimeout { backend: String, timeout_ms: u64 },
}

impl BackendError {
    /// Failures absorbed as an empty branch contribution instead of
    /// erroring the whole query: a missing backend and a stalled one.
    pub fn degrades_to_empty(&self) -> bool {
        matches!(
            self,
            BackendError::Unavailable { .. } | BackendError::RequestTimeout { .. }
        )
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("missing required configuration: {key}")]
    MissingRequired { key: String },

    #[error("invalid configuration value: key={key}, value={value}, reason={reason}")]
    InvalidValue { key: String, value: String, reason: String },

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("configuration parsing failed: {reason}")]
    ParsingFailed { reason: String },
}

/// Result type aliases for convenience
pub type EngineResult<T> = Result<T, EngineError>;
pub type CacheResult<T> = Result<T, CacheError>;
pub type PartitionResult<T> = Result<T, PartitionError>;
pub type BackendResult<T> = Result<T, BackendError>;

/// Check whether an error can be absorbed by degrading to partial results.
///
/// Backend failures and timeouts degrade to an empty branch contribution;
/// cache and configuration errors indicate a bug or misdeployment.
pub fn is_recoverable(error: &EngineError) -> bool {
    matches!(
        error,
        EngineError::Backend(_) | EngineError::Query(QueryError::Timeout { .. })
    )
}
