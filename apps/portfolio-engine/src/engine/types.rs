//! Engine state, per-cycle results, and progress reporting types.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::strategy::TradeRecord;

/// Lifecycle state of the cycle engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineState {
    /// Not started.
    Idle,
    /// Processing cycles.
    Running,
    /// Stopped cooperatively; resumable from the last checkpoint.
    Paused,
    /// Timeline exhausted.
    Completed,
    /// Aborted on a fatal error.
    Failed,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Running => write!(f, "RUNNING"),
            Self::Paused => write!(f, "PAUSED"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Results of one completed cycle across all symbols.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleResult {
    /// Cycle id matching the sync point's rank.
    pub cycle_id: u64,
    /// Aligned timestamp of the sync point.
    pub sync_timestamp: DateTime<Utc>,
    /// Trades per symbol. Failed symbols appear with an empty list.
    pub per_symbol: HashMap<String, Vec<TradeRecord>>,
    /// Symbols whose evaluation failed this cycle.
    pub excluded_symbols: Vec<String>,
    /// Wall-clock time spent on the cycle.
    pub processing: Duration,
    /// Estimated retained size of this result in bytes.
    pub memory_bytes: usize,
}

impl CycleResult {
    /// All trades of the cycle, flattened across symbols.
    pub fn all_trades(&self) -> impl Iterator<Item = &TradeRecord> {
        self.per_symbol.values().flatten()
    }

    /// Total trade count across symbols.
    #[must_use]
    pub fn trade_count(&self) -> usize {
        self.per_symbol.values().map(Vec::len).sum()
    }

    /// Rough retained-size estimate of a set of per-symbol trades.
    ///
    /// Deterministic accounting estimate, not a resident-set measurement:
    /// struct sizes plus heap payloads of owned strings.
    #[must_use]
    pub fn estimate_bytes(per_symbol: &HashMap<String, Vec<TradeRecord>>) -> usize {
        let mut bytes = std::mem::size_of::<Self>();
        for (symbol, trades) in per_symbol {
            bytes += symbol.len() + std::mem::size_of::<String>();
            for trade in trades {
                bytes += std::mem::size_of::<TradeRecord>();
                bytes += trade.symbol.len() + trade.strategy_tag.len();
            }
        }
        bytes
    }
}

/// Point-in-time progress of a running session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineProgress {
    /// Session being processed.
    pub session_id: String,
    /// Engine state at sample time.
    pub state: EngineState,
    /// Cycles completed so far.
    pub completed_cycles: u64,
    /// Total cycles in the timeline.
    pub total_cycles: u64,
    /// Last checkpointed cycle, if any.
    pub checkpoint_cycle: Option<u64>,
    /// Estimated bytes retained in the results buffer.
    pub retained_bytes: usize,
    /// Wall-clock time since the run started.
    pub elapsed: Duration,
}

impl EngineProgress {
    /// Completion fraction in `[0, 1]`.
    #[must_use]
    pub fn fraction(&self) -> f64 {
        if self.total_cycles == 0 {
            return 0.0;
        }
        self.completed_cycles as f64 / self.total_cycles as f64
    }

    /// Cycles per second; 0 before any time has elapsed.
    #[must_use]
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.completed_cycles as f64 / secs
    }

    /// Estimated time remaining, if the rate is known.
    #[must_use]
    pub fn eta(&self) -> Option<Duration> {
        let rate = self.rate();
        if rate == 0.0 {
            return None;
        }
        let remaining = self.total_cycles.saturating_sub(self.completed_cycles);
        Some(Duration::from_secs_f64(remaining as f64 / rate))
    }
}

/// Cooperative stop signal shared with a running engine.
///
/// Cancellation is observed between cycles only; an in-flight cycle always
/// runs to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop at the next cycle boundary.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether a stop has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use crate::engine::strategy::{ConfidenceTier, MarketRegime, TradeAction};

    use super::*;

    fn make_trade(symbol: &str) -> TradeRecord {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        TradeRecord {
            symbol: symbol.to_string(),
            cycle_id: 0,
            action: TradeAction::Long,
            entry_price: dec!(100),
            exit_price: dec!(101),
            quantity: dec!(1),
            leverage: dec!(1),
            entry_time: at,
            exit_time: at,
            pnl: dec!(1),
            pnl_pct: dec!(1),
            strategy_tag: "momentum".to_string(),
            confidence_tier: ConfidenceTier::Medium,
            market_regime_tag: MarketRegime::Ranging,
            quality_score: 1.0,
            was_successful: true,
        }
    }

    #[test]
    fn byte_estimate_grows_with_trades() {
        let empty = HashMap::new();
        let base = CycleResult::estimate_bytes(&empty);

        let mut one = HashMap::new();
        one.insert("BTC".to_string(), vec![make_trade("BTC")]);
        let with_one = CycleResult::estimate_bytes(&one);

        let mut two = HashMap::new();
        two.insert(
            "BTC".to_string(),
            vec![make_trade("BTC"), make_trade("BTC")],
        );
        let with_two = CycleResult::estimate_bytes(&two);

        assert!(base < with_one);
        assert!(with_one < with_two);
    }

    #[test]
    fn progress_fraction_rate_and_eta() {
        let progress = EngineProgress {
            session_id: "s".to_string(),
            state: EngineState::Running,
            completed_cycles: 25,
            total_cycles: 100,
            checkpoint_cycle: None,
            retained_bytes: 0,
            elapsed: Duration::from_secs(5),
        };
        assert!((progress.fraction() - 0.25).abs() < f64::EPSILON);
        assert!((progress.rate() - 5.0).abs() < f64::EPSILON);
        assert_eq!(progress.eta(), Some(Duration::from_secs(15)));

        let idle = EngineProgress {
            elapsed: Duration::ZERO,
            ..progress
        };
        assert_eq!(idle.rate(), 0.0);
        assert_eq!(idle.eta(), None);
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn trade_pnl_is_decimal_exact() {
        let trade = make_trade("BTC");
        assert_eq!(trade.pnl + trade.pnl, Decimal::from(2));
    }
}
