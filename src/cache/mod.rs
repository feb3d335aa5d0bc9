//! Intelligent caching for query results
//!
//! A bounded key/value cache with pluggable eviction: plain LRU, LFU with
//! deterministic tie-breaking, passive TTL expiry, and a learned strategy
//! that scores resident keys with [`AccessPredictor`] and evicts the key
//! least likely to be accessed again.
//!
//! The cache keeps four parallel indexes (value map, frequency map, TTL
//! map, recency queue) behind a single mutex. Every operation leaves
//! the indexes describing the same key set (the TTL map being a subset), so
//! concurrent callers can never observe a half-evicted entry.

pub mod predictor;

pub use predictor::{AccessPattern, AccessPredictor, AccessSample};

use crate::errors::ConfigurationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Eviction strategy applied when the cache is at capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionStrategy {
    /// Evict the least recently used key
    Lru,
    /// Evict the least frequently used key, ties broken by insertion order
    Lfu,
    /// Passive expiry on read; capacity eviction falls back to LRU order
    Ttl,
    /// Evict the key with the lowest predicted access probability
    Intelligent,
}

impl std::fmt::Display for EvictionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvictionStrategy::Lru => write!(f, "lru"),
            EvictionStrategy::Lfu => write!(f, "lfu"),
            EvictionStrategy::Ttl => write!(f, "ttl"),
            EvictionStrategy::Intelligent => write!(f, "intelligent"),
        }
    }
}

impl FromStr for EvictionStrategy {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lru" => Ok(EvictionStrategy::Lru),
            "lfu" => Ok(EvictionStrategy::Lfu),
            "ttl" => Ok(EvictionStrategy::Ttl),
            "intelligent" => Ok(EvictionStrategy::Intelligent),
            other => Err(ConfigurationError::InvalidValue {
                key: "cache.strategy".to_string(),
                value: other.to_string(),
                reason: "expected one of lru, lfu, ttl, intelligent".to_string(),
            }),
        }
    }
}

/// Cache statistics snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub entries: usize,
    pub max_entries: usize,
    pub strategy: EvictionStrategy,
}

/// Frequency record: access count plus insertion sequence for tie-breaking
#[derive(Debug, Clone, Copy)]
struct FrequencyEntry {
    count: u64,
    inserted_seq: u64,
}

struct CacheInner<V> {
    values: HashMap<String, V>,
    frequency: HashMap<String, FrequencyEntry>,
    expiries: HashMap<String, DateTime<Utc>>,
    recency: VecDeque<String>,
    patterns: HashMap<String, AccessPattern>,
    hits: u64,
    misses: u64,
    next_seq: u64,
    max_entries: usize,
}

impl<V> CacheInner<V> {
    /// Remove a key from all four indexes. The single removal path shared by
    /// TTL expiry and capacity eviction.
    fn remove_entry(&mut self, key: &str) -> Option<V> {
        let value = self.values.remove(key);
        if value.is_some() {
            self.frequency.remove(key);
            self.expiries.remove(key);
            self.recency.retain(|k| k != key);
        }
        value
    }

    /// Move a key to the most-recently-used position.
    fn touch(&mut self, key: &str) {
        self.recency.retain(|k| k != key);
        self.recency.push_back(key.to_string());
    }

    fn record_sample(&mut self, key: &str, now: DateTime<Utc>, hit: bool) {
        self.patterns
            .entry(key.to_string())
            .or_default()
            .record(AccessSample::new(now, hit));

        // Miss samples accumulate for keys never inserted; shed the table
        // once it clearly outgrows the resident set.
        if self.patterns.len() > self.max_entries.saturating_mul(4).max(1024) {
            let values = &self.values;
            self.patterns.retain(|k, _| values.contains_key(k));
        }
    }
}

/// Bounded cache with pluggable eviction and per-key access histories
pub struct IntelligentCache<V> {
    inner: Mutex<CacheInner<V>>,
    strategy: EvictionStrategy,
    predictor: AccessPredictor,
}

impl<V: Clone + Send> IntelligentCache<V> {
    pub fn new(max_entries: usize, strategy: EvictionStrategy) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                values: HashMap::new(),
                frequency: HashMap::new(),
                expiries: HashMap::new(),
                recency: VecDeque::new(),
                patterns: HashMap::new(),
                hits: 0,
                misses: 0,
                next_seq: 0,
                max_entries,
            }),
            strategy,
            predictor: AccessPredictor::new(),
        }
    }

    /// Look up a key, expiring it first if its TTL has passed.
    ///
    /// A hit refreshes recency, bumps the frequency count, and records a hit
    /// sample in the key's access pattern; a miss records a miss sample.
    pub async fn get(&self, key: &str) -> Option<V> {
        let now = Utc::now();
        let mut inner = self.inner.lock().await;

        if let Some(expiry) = inner.expiries.get(key).copied() {
            if now >= expiry {
                inner.remove_entry(key);
                debug!(key = key, "cache entry expired on read");
                inner.misses += 1;
                inner.record_sample(key, now, false);
                return None;
            }
        }

        if let Some(value) = inner.values.get(key).cloned() {
            inner.touch(key);
            if let Some(freq) = inner.frequency.get_mut(key) {
                freq.count += 1;
            }
            inner.hits += 1;
            inner.record_sample(key, now, true);
            Some(value)
        } else {
            inner.misses += 1;
            inner.record_sample(key, now, false);
            None
        }
    }

    /// Insert or replace a key, optionally with a time-to-live.
    ///
    /// Inserting a new key into a full cache evicts one entry according to
    /// the configured strategy before the insert.
    pub async fn put(&self, key: &str, value: V, ttl: Option<Duration>) {
        let now = Utc::now();
        let mut inner = self.inner.lock().await;

        if !inner.values.contains_key(key) && inner.values.len() >= inner.max_entries {
            self.evict_one(&mut inner, now);
        }

        inner.values.insert(key.to_string(), value);

        match ttl {
            Some(ttl) => {
                let ttl = chrono::Duration::from_std(ttl)
                    .unwrap_or_else(|_| chrono::Duration::days(3650));
                inner.expiries.insert(key.to_string(), now + ttl);
            }
            None => {
                inner.expiries.remove(key);
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner
            .frequency
            .entry(key.to_string())
            .and_modify(|f| f.count += 1)
            .or_insert(FrequencyEntry {
                count: 1,
                inserted_seq: seq,
            });

        inner.touch(key);
    }

    /// Remove a key explicitly.
    pub async fn remove(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock().await;
        inner.remove_entry(key)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.values.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.values.is_empty()
    }

    pub async fn max_entries(&self) -> usize {
        self.inner.lock().await.max_entries
    }

    /// Resize the cache, evicting down to the new bound if it shrank.
    pub async fn set_max_entries(&self, max_entries: usize) {
        let now = Utc::now();
        let mut inner = self.inner.lock().await;
        inner.max_entries = max_entries;
        while inner.values.len() > inner.max_entries {
            self.evict_one(&mut inner, now);
        }
    }

    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().await;
        let total = inner.hits + inner.misses;
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                inner.hits as f64 / total as f64
            },
            entries: inner.values.len(),
            max_entries: inner.max_entries,
            strategy: self.strategy,
        }
    }

    /// Evict one entry according to the configured strategy.
    fn evict_one(&self, inner: &mut CacheInner<V>, now: DateTime<Utc>) {
        let victim = match self.strategy {
            // Pure-TTL caches have no capacity rule of their own; LRU order
            // is the fallback.
            EvictionStrategy::Lru | EvictionStrategy::Ttl => self.pick_lru(inner),
            EvictionStrategy::Lfu => self.pick_lfu(inner),
            EvictionStrategy::Intelligent => self.pick_coldest(inner, now),
        };

        if let Some(key) = victim {
            debug!(key = %key, strategy = %self.strategy, "evicting cache entry");
            inner.remove_entry(&key);
        }
    }

    fn pick_lru<T>(&self, inner: &CacheInner<T>) -> Option<String> {
        inner.recency.front().cloned()
    }

    fn pick_lfu<T>(&self, inner: &CacheInner<T>) -> Option<String> {
        inner
            .frequency
            .iter()
            .min_by_key(|(_, f)| (f.count, f.inserted_seq))
            .map(|(key, _)| key.clone())
    }

    /// Score every resident key with the predictor and pick the minimum.
    /// With no access-pattern history anywhere, falls back to LRU.
    fn pick_coldest<T>(&self, inner: &CacheInner<T>, now: DateTime<Utc>) -> Option<String> {
        let any_history = inner
            .values
            .keys()
            .any(|k| inner.patterns.get(k).is_some_and(|p| !p.is_empty()));
        if !any_history {
            return self.pick_lru(inner);
        }

        let empty = AccessPattern::new();
        let mut coldest: Option<(String, f64)> = None;
        // Iterate in recency order so score ties resolve deterministically
        // toward the least recently used key.
        for key in &inner.recency {
            let pattern = inner.patterns.get(key).unwrap_or(&empty);
            let score = self.predictor.predict_access_probability(pattern, now);
            match &coldest {
                Some((_, best)) if score >= *best => {}
                _ => coldest = Some((key.clone(), score)),
            }
        }
        coldest.map(|(key, _)| key)
    }
}
