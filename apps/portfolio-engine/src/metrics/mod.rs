//! Portfolio-level metrics: aggregation, statistics, formatting.

mod aggregator;
mod format;
pub mod math;
mod types;

pub use aggregator::MetricsAggregator;
pub use format::{format_pct, format_ratio};
pub use types::{CorrelationMatrix, HistorySummary, PortfolioMetrics};
