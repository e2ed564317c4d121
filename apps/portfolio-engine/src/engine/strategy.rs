//! Pluggable strategy-evaluation contract and trade records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::series::SeriesPoint;
use crate::timeline::SyncPoint;

/// Trade action decided by a strategy at one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeAction {
    /// Open or add to a long position.
    Long,
    /// Open or add to a short position.
    Short,
    /// Close an existing long position.
    CloseLong,
    /// Close an existing short position.
    CloseShort,
    /// No action this cycle.
    Hold,
}

impl TradeAction {
    /// Direction sign for PnL: +1 for long-side, -1 for short-side, 0 for hold.
    #[must_use]
    pub const fn direction(&self) -> i8 {
        match self {
            Self::Long | Self::CloseLong => 1,
            Self::Short | Self::CloseShort => -1,
            Self::Hold => 0,
        }
    }
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
            Self::CloseLong => write!(f, "CLOSE_LONG"),
            Self::CloseShort => write!(f, "CLOSE_SHORT"),
            Self::Hold => write!(f, "HOLD"),
        }
    }
}

/// Confidence bucket a strategy assigns to a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    /// High-conviction signal.
    High,
    /// Ordinary signal.
    #[default]
    Medium,
    /// Marginal signal.
    Low,
}

/// Market regime tag a strategy observed when deciding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MarketRegime {
    /// Sustained upward drift.
    Trending,
    /// Mean-reverting, sideways market.
    #[default]
    Ranging,
    /// Elevated volatility.
    Volatile,
}

/// One completed simulated trade produced by a strategy evaluation.
///
/// Owned by the `CycleResult` that produced it; immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Symbol traded.
    pub symbol: String,
    /// Cycle in which the trade was produced.
    pub cycle_id: u64,
    /// Action taken.
    pub action: TradeAction,
    /// Entry price.
    pub entry_price: Decimal,
    /// Exit price.
    pub exit_price: Decimal,
    /// Quantity traded.
    pub quantity: Decimal,
    /// Leverage applied.
    pub leverage: Decimal,
    /// Entry timestamp.
    pub entry_time: DateTime<Utc>,
    /// Exit timestamp.
    pub exit_time: DateTime<Utc>,
    /// Realized profit and loss.
    pub pnl: Decimal,
    /// Realized return as a percentage of entry notional.
    pub pnl_pct: Decimal,
    /// Strategy that produced the trade.
    pub strategy_tag: String,
    /// Confidence bucket at decision time.
    pub confidence_tier: ConfidenceTier,
    /// Market regime observed at decision time.
    pub market_regime_tag: MarketRegime,
    /// Data quality of the sync point the trade was evaluated at.
    pub quality_score: f64,
    /// Whether the trade met its objective.
    pub was_successful: bool,
}

impl TradeRecord {
    /// Whether the recorded pnl sign is consistent with
    /// `(exit - entry) * direction`.
    #[must_use]
    pub fn pnl_sign_consistent(&self) -> bool {
        let spread = self.exit_price - self.entry_price;
        let direction = Decimal::from(self.action.direction());
        let expected = spread * direction;
        if expected.is_zero() || self.pnl.is_zero() {
            return true;
        }
        expected.is_sign_positive() == self.pnl.is_sign_positive()
    }
}

/// Failure of one symbol's strategy evaluation in one cycle.
///
/// Always recoverable: the engine isolates it to an empty result for the
/// symbol and the cycle continues.
#[derive(Debug, Error)]
pub enum EvaluationError {
    /// Strategy logic rejected the input or failed internally.
    #[error("Strategy failure for {symbol}: {message}")]
    Strategy {
        /// Symbol being evaluated.
        symbol: String,
        /// Strategy-specific failure description.
        message: String,
    },

    /// Data for the symbol could not be prepared.
    #[error("Data failure for {symbol}: {message}")]
    Data {
        /// Symbol being evaluated.
        symbol: String,
        /// Source-specific failure description.
        message: String,
    },
}

/// Pluggable per-symbol decision function.
///
/// Invoked once per symbol per cycle with that symbol's bars truncated to
/// the sync point's timestamp. Implementations must not share mutable state
/// across concurrent invocations; the engine runs them in parallel within
/// a cycle.
#[async_trait]
pub trait StrategyEvaluator: Send + Sync {
    /// Evaluate one symbol at one sync point, returning zero or more
    /// completed trades.
    ///
    /// # Errors
    ///
    /// `EvaluationError` on failure; the engine records an empty result for
    /// the symbol and continues the cycle.
    async fn evaluate(
        &self,
        symbol: &str,
        bars: Vec<SeriesPoint>,
        sync_point: SyncPoint,
    ) -> Result<Vec<TradeRecord>, EvaluationError>;

    /// Name of this evaluator, for logging.
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    use super::*;

    fn make_trade(action: TradeAction, entry: Decimal, exit: Decimal, pnl: Decimal) -> TradeRecord {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        TradeRecord {
            symbol: "BTC".to_string(),
            cycle_id: 0,
            action,
            entry_price: entry,
            exit_price: exit,
            quantity: dec!(1),
            leverage: dec!(1),
            entry_time: at,
            exit_time: at,
            pnl,
            pnl_pct: Decimal::ZERO,
            strategy_tag: "test".to_string(),
            confidence_tier: ConfidenceTier::Medium,
            market_regime_tag: MarketRegime::Ranging,
            quality_score: 1.0,
            was_successful: pnl > Decimal::ZERO,
        }
    }

    #[test]
    fn direction_signs() {
        assert_eq!(TradeAction::Long.direction(), 1);
        assert_eq!(TradeAction::CloseShort.direction(), -1);
        assert_eq!(TradeAction::Hold.direction(), 0);
    }

    #[test]
    fn pnl_sign_consistency() {
        // Long gaining on a rise is consistent.
        let t = make_trade(TradeAction::Long, dec!(100), dec!(105), dec!(5));
        assert!(t.pnl_sign_consistent());

        // Short gaining on a fall is consistent.
        let t = make_trade(TradeAction::Short, dec!(100), dec!(95), dec!(5));
        assert!(t.pnl_sign_consistent());

        // Long gaining on a fall is inconsistent.
        let t = make_trade(TradeAction::Long, dec!(100), dec!(95), dec!(5));
        assert!(!t.pnl_sign_consistent());
    }

    #[test]
    fn action_display_matches_wire_names() {
        assert_eq!(TradeAction::CloseLong.to_string(), "CLOSE_LONG");
        assert_eq!(TradeAction::Hold.to_string(), "HOLD");
    }
}
