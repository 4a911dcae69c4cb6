//! Engine tunables

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the matching engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum number of legs in a ring.
    pub max_ring_depth: usize,
    /// Whether cross-book ring matching runs after direct matching.
    pub ring_enabled: bool,
    /// Match ticker interval in milliseconds.
    pub match_interval_ms: u64,
    /// Conditional oracle ticker interval in milliseconds.
    pub oracle_interval_ms: u64,
    /// Remainders at or below this many smallest units are consumed into
    /// the trade rather than left resting.
    pub dust_threshold: u64,
    /// Maximum ring-search rounds per match tick.
    pub ring_round_cap: usize,
}

impl Config {
    pub fn match_interval(&self) -> Duration {
        Duration::from_millis(self.match_interval_ms)
    }

    pub fn oracle_interval(&self) -> Duration {
        Duration::from_millis(self.oracle_interval_ms)
    }

    pub fn dust(&self) -> U256 {
        U256::from(self.dust_threshold)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_ring_depth: 5,
            ring_enabled: true,
            match_interval_ms: 50,
            oracle_interval_ms: 1_000,
            dust_threshold: 100,
            ring_round_cap: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_ring_depth, 5);
        assert!(config.ring_enabled);
        assert_eq!(config.match_interval(), Duration::from_millis(50));
        assert_eq!(config.dust(), U256::from(100));
        assert_eq!(config.ring_round_cap, 10);
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let config: Config = serde_json::from_str("{\"max_ring_depth\":3}").unwrap();
        assert_eq!(config.max_ring_depth, 3);
        assert!(config.ring_enabled);
        assert_eq!(config.dust_threshold, 100);
    }
}
