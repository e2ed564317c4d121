//! Portfolio metric snapshot types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Pairwise correlation of per-symbol PnL series.
///
/// `values[i][j]` is the Pearson correlation of symbols `i` and `j`;
/// `None` marks undefined entries (a zero-variance series). The diagonal
/// is always `Some(1.0)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    /// Symbol order of rows and columns.
    pub symbols: Vec<String>,
    /// Correlation entries, `None` where undefined.
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    /// Mean of defined off-diagonal entries. `None` when every
    /// off-diagonal entry is undefined.
    #[must_use]
    pub fn average_off_diagonal(&self) -> Option<f64> {
        let mut sum = 0.0;
        let mut count = 0_usize;
        for (i, row) in self.values.iter().enumerate() {
            for (j, entry) in row.iter().enumerate() {
                if i == j {
                    continue;
                }
                if let Some(value) = entry {
                    sum += value;
                    count += 1;
                }
            }
        }
        (count > 0).then(|| sum / count as f64)
    }
}

/// Portfolio-level metrics for one cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    /// Cycle the snapshot describes.
    pub cycle_id: u64,
    /// Sync timestamp of the cycle.
    pub timestamp: DateTime<Utc>,
    /// Total realized PnL across all trades of the cycle.
    pub total_pnl: Decimal,
    /// Cycle PnL relative to the cumulative balance before the cycle, as
    /// a fraction. 0 when there is no prior balance.
    pub portfolio_return_pct: f64,
    /// Fraction of successful trades, 0 when no trades.
    pub win_rate: f64,
    /// Per-cycle Sharpe ratio of trade returns, not annualized. 0 when
    /// returns have no dispersion.
    pub sharpe_ratio: f64,
    /// Pairwise PnL correlations.
    pub correlation: CorrelationMatrix,
    /// Mean defined off-diagonal correlation.
    pub avg_correlation: Option<f64>,
    /// 1 minus the Herfindahl index of absolute PnL shares. 0 when fewer
    /// than two symbols traded.
    pub diversification_score: f64,
    /// Herfindahl index of absolute PnL shares.
    pub concentration: f64,
    /// Magnitude of the 5th percentile of per-trade returns.
    pub var_95: f64,
    /// Maximum peak-to-trough drawdown of cumulative portfolio balance,
    /// as a fraction of the peak.
    pub max_drawdown: f64,
    /// Symbol with the highest cycle PnL, if any traded.
    pub best_performer: Option<String>,
    /// Symbol with the lowest cycle PnL, if any traded.
    pub worst_performer: Option<String>,
    /// Mean quality score across the cycle's trades.
    pub avg_quality: f64,
    /// Trades in the cycle.
    pub trade_count: usize,
}

impl std::fmt::Display for PortfolioMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use super::format::{format_pct, format_ratio};

        write!(
            f,
            "cycle {} | pnl {} | win {} | sharpe {} | corr {} | div {} | dd {}",
            self.cycle_id,
            self.total_pnl,
            format_pct(self.win_rate),
            format_ratio(self.sharpe_ratio),
            self.avg_correlation
                .map_or_else(|| "n/a".to_string(), format_ratio),
            format_ratio(self.diversification_score),
            format_pct(self.max_drawdown),
        )
    }
}

/// Aggregate view over a window of retained snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySummary {
    /// Snapshots covered by the window.
    pub snapshots: usize,
    /// Total PnL over the window.
    pub total_pnl: Decimal,
    /// Mean win rate over the window.
    pub avg_win_rate: f64,
    /// Mean Sharpe over the window.
    pub avg_sharpe: f64,
    /// Worst max-drawdown seen in the window.
    pub worst_drawdown: f64,
    /// First cycle in the window.
    pub from_cycle: Option<u64>,
    /// Last cycle in the window.
    pub to_cycle: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_off_diagonal_skips_undefined() {
        let matrix = CorrelationMatrix {
            symbols: vec!["A".into(), "B".into(), "C".into()],
            values: vec![
                vec![Some(1.0), Some(0.5), None],
                vec![Some(0.5), Some(1.0), None],
                vec![None, None, Some(1.0)],
            ],
        };
        assert_eq!(matrix.average_off_diagonal(), Some(0.5));
    }

    #[test]
    fn all_undefined_off_diagonal_is_none() {
        let matrix = CorrelationMatrix {
            symbols: vec!["A".into(), "B".into()],
            values: vec![
                vec![Some(1.0), None],
                vec![None, Some(1.0)],
            ],
        };
        assert_eq!(matrix.average_off_diagonal(), None);
    }
}
