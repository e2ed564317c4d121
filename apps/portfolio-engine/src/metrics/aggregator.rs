//! Portfolio metrics aggregation over completed cycles.

use std::collections::{BTreeSet, HashMap, VecDeque};

use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tracing::debug;

use crate::engine::CycleResult;

use super::math::{herfindahl, mean, pearson, percentile, std_dev};
use super::types::{CorrelationMatrix, HistorySummary, PortfolioMetrics};

/// Correlation time-bucket width in seconds.
const CORRELATION_BUCKET_SECS: i64 = 60;

/// Rolling aggregator of portfolio-level metrics.
///
/// Keeps a bounded history of snapshots for windowed queries. Money stays
/// in `Decimal`; ratios and statistics are `f64`.
#[derive(Debug)]
pub struct MetricsAggregator {
    history: VecDeque<PortfolioMetrics>,
    capacity: usize,
}

impl MetricsAggregator {
    /// Create an aggregator retaining up to `capacity` snapshots.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            history: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Retained snapshots, oldest first.
    #[must_use]
    pub fn snapshots(&self) -> &VecDeque<PortfolioMetrics> {
        &self.history
    }

    /// Compute the snapshot for one cycle and retain it.
    ///
    /// `prior_balances` seeds the drawdown replay with the cumulative
    /// per-symbol balances before this cycle.
    pub fn aggregate(
        &mut self,
        result: &CycleResult,
        prior_balances: &HashMap<String, Decimal>,
    ) -> PortfolioMetrics {
        let trades: Vec<_> = result.all_trades().collect();

        let total_pnl: Decimal = trades.iter().map(|t| t.pnl).sum();

        let prior_total: Decimal = prior_balances.values().copied().sum();
        let portfolio_return_pct = match (total_pnl.to_f64(), prior_total.to_f64()) {
            (Some(pnl), Some(prior)) if prior != 0.0 => pnl / prior,
            _ => 0.0,
        };

        let win_rate = if trades.is_empty() {
            0.0
        } else {
            trades.iter().filter(|t| t.was_successful).count() as f64 / trades.len() as f64
        };

        let returns: Vec<f64> = trades
            .iter()
            .filter_map(|t| t.pnl_pct.to_f64())
            .collect();
        let sharpe_ratio = {
            let sd = std_dev(&returns);
            if sd == 0.0 { 0.0 } else { mean(&returns) / sd }
        };

        let var_95 = percentile(&returns, 5.0).abs();

        let per_symbol_pnl = Self::per_symbol_pnl(result);
        let correlation = Self::correlation_matrix(result);
        let avg_correlation = correlation.average_off_diagonal();

        let (diversification_score, concentration) =
            Self::diversification(&per_symbol_pnl);

        let (best_performer, worst_performer) = Self::extremes(&per_symbol_pnl);

        let max_drawdown = Self::max_drawdown(result, prior_balances);

        let qualities: Vec<f64> = trades.iter().map(|t| t.quality_score).collect();
        let avg_quality = mean(&qualities);

        let metrics = PortfolioMetrics {
            cycle_id: result.cycle_id,
            timestamp: result.sync_timestamp,
            total_pnl,
            portfolio_return_pct,
            win_rate,
            sharpe_ratio,
            correlation,
            avg_correlation,
            diversification_score,
            concentration,
            var_95,
            max_drawdown,
            best_performer,
            worst_performer,
            avg_quality,
            trade_count: trades.len(),
        };

        debug!(
            cycle_id = metrics.cycle_id,
            total_pnl = %metrics.total_pnl,
            win_rate = metrics.win_rate,
            sharpe = metrics.sharpe_ratio,
            "Metrics aggregated"
        );

        self.history.push_back(metrics.clone());
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }
        metrics
    }

    /// Windowed summary over the last `window_days` days of snapshots,
    /// anchored at the newest snapshot's timestamp.
    #[must_use]
    pub fn history(&self, window_days: i64) -> HistorySummary {
        let cutoff = self
            .history
            .back()
            .map(|latest| latest.timestamp - Duration::days(window_days));

        let window: Vec<&PortfolioMetrics> = match cutoff {
            Some(cutoff) => self
                .history
                .iter()
                .filter(|m| m.timestamp >= cutoff)
                .collect(),
            None => Vec::new(),
        };

        let win_rates: Vec<f64> = window.iter().map(|m| m.win_rate).collect();
        let sharpes: Vec<f64> = window.iter().map(|m| m.sharpe_ratio).collect();

        HistorySummary {
            snapshots: window.len(),
            total_pnl: window.iter().map(|m| m.total_pnl).sum(),
            avg_win_rate: mean(&win_rates),
            avg_sharpe: mean(&sharpes),
            worst_drawdown: window
                .iter()
                .map(|m| m.max_drawdown)
                .fold(0.0, f64::max),
            from_cycle: window.first().map(|m| m.cycle_id),
            to_cycle: window.last().map(|m| m.cycle_id),
        }
    }

    fn per_symbol_pnl(result: &CycleResult) -> Vec<(String, Decimal)> {
        let mut pnl: Vec<(String, Decimal)> = result
            .per_symbol
            .iter()
            .filter(|(_, trades)| !trades.is_empty())
            .map(|(symbol, trades)| {
                (symbol.clone(), trades.iter().map(|t| t.pnl).sum())
            })
            .collect();
        pnl.sort_by(|a, b| a.0.cmp(&b.0));
        pnl
    }

    /// Pairwise Pearson correlation of per-symbol PnL, bucketed into
    /// fixed time slots by trade exit time.
    fn correlation_matrix(result: &CycleResult) -> CorrelationMatrix {
        let mut symbols: Vec<String> = result
            .per_symbol
            .iter()
            .filter(|(_, trades)| !trades.is_empty())
            .map(|(symbol, _)| symbol.clone())
            .collect();
        symbols.sort();

        // Union of occupied buckets across symbols.
        let mut buckets = BTreeSet::new();
        for symbol in &symbols {
            for trade in &result.per_symbol[symbol] {
                buckets.insert(trade.exit_time.timestamp() / CORRELATION_BUCKET_SECS);
            }
        }
        let buckets: Vec<i64> = buckets.into_iter().collect();

        let series: Vec<Vec<f64>> = symbols
            .iter()
            .map(|symbol| {
                let mut by_bucket: HashMap<i64, f64> = HashMap::new();
                for trade in &result.per_symbol[symbol] {
                    let bucket = trade.exit_time.timestamp() / CORRELATION_BUCKET_SECS;
                    *by_bucket.entry(bucket).or_insert(0.0) +=
                        trade.pnl.to_f64().unwrap_or(0.0);
                }
                buckets
                    .iter()
                    .map(|b| by_bucket.get(b).copied().unwrap_or(0.0))
                    .collect()
            })
            .collect();

        let n = symbols.len();
        let mut values = vec![vec![None; n]; n];
        for i in 0..n {
            values[i][i] = Some(1.0);
            for j in (i + 1)..n {
                let corr = pearson(&series[i], &series[j]);
                values[i][j] = corr;
                values[j][i] = corr;
            }
        }

        CorrelationMatrix { symbols, values }
    }

    fn diversification(per_symbol_pnl: &[(String, Decimal)]) -> (f64, f64) {
        let magnitudes: Vec<f64> = per_symbol_pnl
            .iter()
            .filter_map(|(_, pnl)| pnl.abs().to_f64())
            .filter(|m| *m > 0.0)
            .collect();

        let concentration = herfindahl(&magnitudes);
        let score = if magnitudes.len() < 2 {
            0.0
        } else {
            1.0 - concentration
        };
        (score, concentration)
    }

    fn extremes(per_symbol_pnl: &[(String, Decimal)]) -> (Option<String>, Option<String>) {
        let best = per_symbol_pnl
            .iter()
            .max_by_key(|(_, pnl)| *pnl)
            .map(|(symbol, _)| symbol.clone());
        let worst = per_symbol_pnl
            .iter()
            .min_by_key(|(_, pnl)| *pnl)
            .map(|(symbol, _)| symbol.clone());
        (best, worst)
    }

    /// Maximum peak-to-trough drawdown of cumulative portfolio balance,
    /// replaying the cycle's trades in exit-time order seeded from the
    /// balances before the cycle.
    fn max_drawdown(
        result: &CycleResult,
        prior_balances: &HashMap<String, Decimal>,
    ) -> f64 {
        let mut trades: Vec<_> = result.all_trades().collect();
        trades.sort_by_key(|t| t.exit_time);

        let seed: Decimal = prior_balances.values().copied().sum();
        let mut balance = seed.to_f64().unwrap_or(0.0);
        let mut peak = balance;
        let mut worst = 0.0_f64;

        for trade in trades {
            balance += trade.pnl.to_f64().unwrap_or(0.0);
            if balance > peak {
                peak = balance;
            } else if peak > 0.0 {
                worst = worst.max((peak - balance) / peak);
            }
        }
        worst
    }
}
