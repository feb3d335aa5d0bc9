//! Access prediction for the intelligent eviction strategy
//!
//! The predictor estimates the probability that a cache key is accessed in
//! the near future, from that key's recent access history alone. It holds no
//! state of its own: given the same history and evaluation time it always
//! produces the same score.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Probability assigned to keys that have never been accessed.
const NO_HISTORY_SCORE: f64 = 0.1;

/// Probability assigned to keys with history, none of it recent.
const STALE_HISTORY_SCORE: f64 = 0.2;

/// One observed access to a cache key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessSample {
    /// When the access happened
    pub timestamp: DateTime<Utc>,
    /// Whether the access was a cache hit
    pub hit: bool,
    /// Hour of day (0-23), retained for periodicity analysis
    pub hour: u32,
    /// Day of week (0 = Monday), retained for periodicity analysis
    pub weekday: u32,
}

impl AccessSample {
    pub fn new(timestamp: DateTime<Utc>, hit: bool) -> Self {
        Self {
            timestamp,
            hit,
            hour: timestamp.hour(),
            weekday: timestamp.weekday().num_days_from_monday(),
        }
    }
}

/// Per-key access history, trimmed to the last 24 hours
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessPattern {
    samples: Vec<AccessSample>,
}

impl AccessPattern {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample and drop everything older than 24 hours.
    pub fn record(&mut self, sample: AccessSample) {
        let cutoff = sample.timestamp - Duration::hours(24);
        self.samples.push(sample);
        self.samples.retain(|s| s.timestamp >= cutoff);
    }

    pub fn samples(&self) -> &[AccessSample] {
        &self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Estimates near-future access probability from access history
#[derive(Debug, Clone, Default)]
pub struct AccessPredictor;

impl AccessPredictor {
    pub fn new() -> Self {
        Self
    }

    /// Predict the probability of a near-future access, in `[0, 1]`.
    ///
    /// Keys with no history score a low constant so fresh entries are biased
    /// toward eviction; keys whose history is entirely older than an hour
    /// score slightly above that. Otherwise the score is a weighted blend of
    /// access frequency, recency, and hit ratio over the last hour.
    pub fn predict_access_probability(
        &self,
        pattern: &AccessPattern,
        now: DateTime<Utc>,
    ) -> f64 {
        if pattern.is_empty() {
            return NO_HISTORY_SCORE;
        }

        let hour_ago = now - Duration::hours(1);
        let recent: Vec<&AccessSample> = pattern
            .samples()
            .iter()
            .filter(|s| s.timestamp >= hour_ago)
            .collect();

        if recent.is_empty() {
            return STALE_HISTORY_SCORE;
        }

        // Accesses per minute over the hour window, capped at 1.0
        let frequency = (recent.len() as f64 / 60.0).min(1.0);

        let last_access = recent
            .iter()
            .map(|s| s.timestamp)
            .max()
            .unwrap_or(hour_ago);
        let seconds_since = (now - last_access).num_seconds().max(1) as f64;
        let recency = (60.0 / seconds_since).min(1.0);

        let hits = recent.iter().filter(|s| s.hit).count();
        let hit_ratio = hits as f64 / recent.len() as f64;

        (0.3 * frequency + 0.4 * recency + 0.3 * hit_ratio).min(1.0)
    }
}
