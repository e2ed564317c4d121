//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::engine::RetentionPolicy;
use crate::series::Resolution;

/// Hard cap on within-cycle parallelism when auto-sizing.
pub const MAX_AUTO_CONCURRENCY: usize = 32;

/// Configuration for a backtest session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Symbols to synchronize and evaluate.
    pub symbols: Vec<String>,
    /// Bar resolution of the run.
    pub resolution: Resolution,
    /// Minimum mean quality for a sync point to be retained (0.8 default).
    pub min_data_quality: f64,
    /// Concurrent per-symbol evaluations within a cycle. 0 = auto
    /// (symbol count, capped).
    pub max_concurrency: usize,
    /// Checkpoint every this many cycles.
    pub checkpoint_interval: u64,
    /// Retention limits for buffered cycle results.
    pub retention: RetentionPolicy,
    /// Metric snapshots kept for history queries.
    pub history_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            resolution: Resolution::M1,
            min_data_quality: 0.8,
            max_concurrency: 0,
            checkpoint_interval: 100,
            retention: RetentionPolicy::default(),
            history_capacity: 1000,
        }
    }
}

impl EngineConfig {
    /// Effective within-cycle parallelism for `symbol_count` symbols.
    #[must_use]
    pub fn effective_concurrency(&self, symbol_count: usize) -> usize {
        let limit = if self.max_concurrency == 0 {
            symbol_count.min(MAX_AUTO_CONCURRENCY)
        } else {
            self.max_concurrency
        };
        limit.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_concurrency_tracks_symbol_count() {
        let config = EngineConfig::default();
        assert_eq!(config.effective_concurrency(4), 4);
        assert_eq!(config.effective_concurrency(100), MAX_AUTO_CONCURRENCY);
        assert_eq!(config.effective_concurrency(0), 1);
    }

    #[test]
    fn explicit_concurrency_wins() {
        let config = EngineConfig {
            max_concurrency: 2,
            ..EngineConfig::default()
        };
        assert_eq!(config.effective_concurrency(100), 2);
    }
}
