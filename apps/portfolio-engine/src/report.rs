//! Fire-and-forget publication of per-cycle portfolio metrics.

use tokio::sync::mpsc;
use tracing::warn;

use crate::metrics::PortfolioMetrics;

/// Downstream consumer of per-cycle metric snapshots.
///
/// Publication never blocks a cycle and never fails it: implementations
/// drop on backpressure rather than propagate errors.
pub trait MetricsSink: Send + Sync {
    /// Publish one cycle's metrics. Must not block.
    fn publish(&self, metrics: &PortfolioMetrics);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpSink;

impl MetricsSink for NoOpSink {
    fn publish(&self, _metrics: &PortfolioMetrics) {}
}

/// Sink forwarding metrics over a bounded channel.
///
/// When the channel is full the snapshot is dropped with a warning; the
/// engine is never slowed by a lagging consumer.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<PortfolioMetrics>,
}

impl ChannelSink {
    /// Create a sink and its receiving end with the given buffer capacity.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<PortfolioMetrics>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl MetricsSink for ChannelSink {
    fn publish(&self, metrics: &PortfolioMetrics) {
        if let Err(e) = self.tx.try_send(metrics.clone()) {
            warn!(
                cycle_id = metrics.cycle_id,
                error = %e,
                "Dropping metrics snapshot: sink backpressure"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use crate::metrics::CorrelationMatrix;

    use super::*;

    fn make_metrics(cycle_id: u64) -> PortfolioMetrics {
        PortfolioMetrics {
            cycle_id,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            total_pnl: Decimal::ZERO,
            portfolio_return_pct: 0.0,
            win_rate: 0.0,
            sharpe_ratio: 0.0,
            correlation: CorrelationMatrix {
                symbols: Vec::new(),
                values: Vec::new(),
            },
            avg_correlation: None,
            diversification_score: 0.0,
            concentration: 1.0,
            var_95: 0.0,
            max_drawdown: 0.0,
            best_performer: None,
            worst_performer: None,
            avg_quality: 0.0,
            trade_count: 0,
        }
    }

    #[tokio::test]
    async fn channel_sink_forwards_metrics() {
        let (sink, mut rx) = ChannelSink::new(4);
        sink.publish(&make_metrics(7));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.cycle_id, 7);
    }

    #[tokio::test]
    async fn full_channel_drops_without_blocking() {
        let (sink, mut rx) = ChannelSink::new(1);
        sink.publish(&make_metrics(1));
        sink.publish(&make_metrics(2));

        assert_eq!(rx.recv().await.unwrap().cycle_id, 1);
        assert!(rx.try_recv().is_err());
    }
}
