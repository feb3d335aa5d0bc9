//! Configuration management for the GraphRAG engine

use crate::cache::EvictionStrategy;
use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub partition: PartitionConfig,
    pub query: QueryConfig,
    pub logging: LoggingConfig,
}

/// Cache subsystem configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of resident entries
    pub max_entries: usize,
    /// Eviction strategy applied at capacity
    pub strategy: EvictionStrategy,
}

/// Graph partitioning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionConfig {
    /// Maximum node count per partition
    pub max_partition_size: usize,
    /// Embedding dimension used for partition centroids
    pub embedding_dim: usize,
}

/// Query dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Top-k limit for vector similarity search
    pub semantic_limit: usize,
    /// Minimum similarity score for semantic results
    pub score_threshold: f32,
    /// Maximum entity-like terms extracted from a query
    pub max_entity_terms: usize,
    /// Hop bound for graph traversal queries
    pub traversal_depth: usize,
    /// Hop bound for relationship shortest-path queries
    pub relationship_max_hops: usize,
    /// Result cap after hybrid merging
    pub hybrid_result_limit: usize,
    /// Result cap for contextual reasoning
    pub reasoning_result_limit: usize,
    /// Optional per-backend timeout; unset means no bound
    pub backend_timeout_ms: Option<u64>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// "json" or "text"
    pub format: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig {
                max_entries: 10_000,
                strategy: EvictionStrategy::Intelligent,
            },
            partition: PartitionConfig {
                max_partition_size: 1_000,
                embedding_dim: 384,
            },
            query: QueryConfig {
                semantic_limit: 10,
                score_threshold: 0.5,
                max_entity_terms: 5,
                traversal_depth: 2,
                relationship_max_hops: 3,
                hybrid_result_limit: 15,
                reasoning_result_limit: 20,
                backend_timeout_ms: None,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "text".to_string(),
            },
        }
    }
}

impl EngineConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigurationError> {
        let content = std::fs::read_to_string(&path).map_err(|_| {
            ConfigurationError::FileNotFound {
                path: path.as_ref().to_string_lossy().to_string(),
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            ConfigurationError::ParsingFailed {
                reason: e.to_string(),
            }
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn load_from_env() -> Result<Self, ConfigurationError> {
        let mut config = Self::default();

        if let Ok(max_entries) = std::env::var("GRAPHRAG_CACHE_MAX_ENTRIES") {
            config.cache.max_entries = max_entries.parse().map_err(|_| {
                ConfigurationError::InvalidValue {
                    key: "cache.max_entries".to_string(),
                    value: max_entries.clone(),
                    reason: "not a valid integer".to_string(),
                }
            })?;
        }

        if let Ok(strategy) = std::env::var("GRAPHRAG_CACHE_STRATEGY") {
            config.cache.strategy = strategy.parse().map_err(|_| {
                ConfigurationError::InvalidValue {
                    key: "cache.strategy".to_string(),
                    value: strategy.clone(),
                    reason: "expected one of lru, lfu, ttl, intelligent".to_string(),
                }
            })?;
        }

        if let Ok(size) = std::env::var("GRAPHRAG_MAX_PARTITION_SIZE") {
            config.partition.max_partition_size = size.parse().map_err(|_| {
                ConfigurationError::InvalidValue {
                    key: "partition.max_partition_size".to_string(),
                    value: size.clone(),
                    reason: "not a valid integer".to_string(),
                }
            })?;
        }

        if let Ok(level) = std::env::var("GRAPHRAG_LOG_LEVEL") {
            config.logging.level = level;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.cache.max_entries == 0 {
            return Err(ConfigurationError::InvalidValue {
                key: "cache.max_entries".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.partition.max_partition_size == 0 {
            return Err(ConfigurationError::InvalidValue {
                key: "partition.max_partition_size".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        if !(0.0..=1.0).contains(&self.query.score_threshold) {
            return Err(ConfigurationError::InvalidValue {
                key: "query.score_threshold".to_string(),
                value: self.query.score_threshold.to_string(),
                reason: "must be between 0.0 and 1.0".to_string(),
            });
        }

        if self.query.semantic_limit == 0 {
            return Err(ConfigurationError::InvalidValue {
                key: "query.semantic_limit".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.logging.format != "json" && self.logging.format != "text" {
            return Err(ConfigurationError::InvalidValue {
                key: "logging.format".to_string(),
                value: self.logging.format.clone(),
                reason: "expected \"json\" or \"text\"".to_string(),
            });
        }

        Ok(())
    }

    /// The configured backend timeout as a [`Duration`], if set.
    pub fn backend_timeout(&self) -> Option<Duration> {
        self.query.backend_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_validates() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_cache_size() {
        let mut config = EngineConfig::default();
        config.cache.max_entries = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut config = EngineConfig::default();
        config.query.score_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[cache]
max_entries = 500
strategy = "lru"

[partition]
max_partition_size = 128
embedding_dim = 64

[query]
semantic_limit = 5
score_threshold = 0.3
max_entity_terms = 5
traversal_depth = 2
relationship_max_hops = 3
hybrid_result_limit = 15
reasoning_result_limit = 20

[logging]
level = "debug"
format = "json"
"#
        )
        .unwrap();

        let config = EngineConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.cache.max_entries, 500);
        assert_eq!(config.cache.strategy, EvictionStrategy::Lru);
        assert_eq!(config.partition.max_partition_size, 128);
        assert!(config.query.backend_timeout_ms.is_none());
    }

    #[test]
    fn missing_file_is_reported() {
        let result = EngineConfig::load_from_file("/nonexistent/engine.toml");
        assert!(matches!(
            result,
            Err(ConfigurationError::FileNotFound { .. })
        ));
    }
}
