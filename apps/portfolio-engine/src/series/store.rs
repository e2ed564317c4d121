//! Series Store contract and in-memory implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;

use super::types::{Resolution, SeriesPoint};

/// Errors from a series source.
///
/// Absence of a source for a symbol is *not* an error: stores return an
/// empty series so callers can exclude the symbol and continue.
#[derive(Debug, Error)]
pub enum SeriesError {
    /// IO error reading data.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Query against the underlying source failed.
    #[error("Series query failed for {symbol}: {message}")]
    Query {
        /// Symbol being queried.
        symbol: String,
        /// Source-specific failure description.
        message: String,
    },

    /// Requested range is invalid.
    #[error("Invalid range: start {start} > end {end}")]
    InvalidRange {
        /// Range start.
        start: DateTime<Utc>,
        /// Range end.
        end: DateTime<Utc>,
    },
}

/// Read-only provider of ordered per-symbol, per-resolution price bars.
///
/// Implementations may suspend on I/O; they are queried concurrently by
/// multiple symbol evaluations within a cycle and must be internally
/// synchronized.
#[async_trait]
pub trait SeriesStore: Send + Sync {
    /// Fetch bars for `symbol` at `resolution` within `[start, end]`
    /// (inclusive), ordered by timestamp ascending.
    ///
    /// A symbol with no source yields `Ok(vec![])`.
    async fn get_bars(
        &self,
        symbol: &str,
        resolution: Resolution,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SeriesPoint>, SeriesError>;

    /// Fetch the available bar timestamps for `symbol` within `[start, end]`
    /// (inclusive), ordered ascending.
    ///
    /// A lightweight existence check for callers that do not need prices. Timeline
    /// construction fetches full bars via [`Self::get_bars`] instead, since
    /// quality scoring needs OHLCV values, not just presence.
    async fn available_timestamps(
        &self,
        symbol: &str,
        resolution: Resolution,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, SeriesError>;

    /// Name of this store, for logging.
    fn name(&self) -> &'static str;
}

/// In-memory series store for tests and replay.
#[derive(Debug, Default)]
pub struct InMemorySeriesStore {
    data: RwLock<HashMap<(String, Resolution), Vec<SeriesPoint>>>,
}

impl InMemorySeriesStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Add a series for a symbol, keeping it sorted by timestamp.
    pub async fn add_series(&self, symbol: &str, resolution: Resolution, mut bars: Vec<SeriesPoint>) {
        bars.sort_by_key(|b| b.timestamp);
        self.data
            .write()
            .await
            .insert((symbol.to_string(), resolution), bars);
    }
}

#[async_trait]
impl SeriesStore for InMemorySeriesStore {
    async fn get_bars(
        &self,
        symbol: &str,
        resolution: Resolution,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SeriesPoint>, SeriesError> {
        if start > end {
            return Err(SeriesError::InvalidRange { start, end });
        }

        let data = self.data.read().await;
        let Some(bars) = data.get(&(symbol.to_string(), resolution)) else {
            return Ok(Vec::new());
        };

        Ok(bars
            .iter()
            .filter(|b| b.timestamp >= start && b.timestamp <= end)
            .cloned()
            .collect())
    }

    async fn available_timestamps(
        &self,
        symbol: &str,
        resolution: Resolution,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, SeriesError> {
        let bars = self.get_bars(symbol, resolution, start, end).await?;
        Ok(bars.into_iter().map(|b| b.timestamp).collect())
    }

    fn name(&self) -> &'static str {
        "InMemory"
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    use super::*;

    fn bar_at(hour: u32) -> SeriesPoint {
        SeriesPoint::new(
            Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap(),
            dec!(100),
            dec!(101),
            dec!(99),
            dec!(100.5),
            dec!(1000),
        )
    }

    #[tokio::test]
    async fn missing_symbol_yields_empty() {
        let store = InMemorySeriesStore::new();
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();

        let bars = store
            .get_bars("MISSING", Resolution::H1, start, end)
            .await
            .unwrap();
        assert!(bars.is_empty());
    }

    #[tokio::test]
    async fn range_filter_is_inclusive() {
        let store = InMemorySeriesStore::new();
        store
            .add_series("BTC", Resolution::H1, vec![bar_at(9), bar_at(10), bar_at(11)])
            .await;

        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let bars = store
            .get_bars("BTC", Resolution::H1, start, end)
            .await
            .unwrap();

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].timestamp, start);
        assert_eq!(bars[1].timestamp, end);
    }

    #[tokio::test]
    async fn invalid_range_is_an_error() {
        let store = InMemorySeriesStore::new();
        let start = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();

        let result = store.get_bars("BTC", Resolution::H1, start, end).await;
        assert!(matches!(result, Err(SeriesError::InvalidRange { .. })));
    }

    #[tokio::test]
    async fn unsorted_input_is_sorted_on_insert() {
        let store = InMemorySeriesStore::new();
        store
            .add_series("ETH", Resolution::H1, vec![bar_at(11), bar_at(9), bar_at(10)])
            .await;

        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();
        let stamps = store
            .available_timestamps("ETH", Resolution::H1, start, end)
            .await
            .unwrap();

        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }
}
