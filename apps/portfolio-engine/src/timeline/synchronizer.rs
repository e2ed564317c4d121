//! Builds the aligned, quality-filtered master timeline across symbols.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::series::{Resolution, SeriesError, SeriesPoint, SeriesStore, bar_quality};

use super::types::{SyncPoint, Timeline};

/// Errors from timeline construction.
#[derive(Debug, Error)]
pub enum TimelineError {
    /// Fewer than two symbols yielded any timestamps.
    #[error("Insufficient data: only {usable} of {requested} symbols have timestamps")]
    DataUnavailable {
        /// Symbols with at least one timestamp in range.
        usable: usize,
        /// Symbols originally requested.
        requested: usize,
    },

    /// No timestamp is shared by all usable symbols (or none survived
    /// quality filtering).
    #[error("No common timeline across symbols")]
    NoCommonTimeline,

    /// Underlying series source failed.
    #[error(transparent)]
    Series(#[from] SeriesError),
}

/// Builds one strictly-increasing sequence of sync points usable by all
/// participating symbols.
pub struct TimelineSynchronizer {
    store: Arc<dyn SeriesStore>,
    min_data_quality: f64,
}

impl std::fmt::Debug for TimelineSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimelineSynchronizer")
            .field("store", &self.store.name())
            .field("min_data_quality", &self.min_data_quality)
            .finish()
    }
}

/// Mean per-symbol bar quality at one timestamp.
///
/// Pure function of the bars passed in: one entry per participating symbol,
/// `None` where the symbol has no bar at the timestamp.
#[must_use]
pub fn quality_score(bars: &[Option<&SeriesPoint>]) -> f64 {
    if bars.is_empty() {
        return 0.0;
    }
    let total: f64 = bars.iter().map(|b| bar_quality(*b)).sum();
    total / bars.len() as f64
}

impl TimelineSynchronizer {
    /// Create a synchronizer over a series store with a quality threshold.
    pub fn new(store: Arc<dyn SeriesStore>, min_data_quality: f64) -> Self {
        Self {
            store,
            min_data_quality,
        }
    }

    /// Build the master timeline for `symbols` over `[start, end]`.
    ///
    /// Symbols whose source yields no timestamps are excluded (with a
    /// warning) rather than aborting the build. A timestamp is a candidate
    /// only when every remaining symbol has a bar at it; candidates are
    /// retained when their mean quality is at or above the threshold.
    ///
    /// # Errors
    ///
    /// `DataUnavailable` when fewer than two symbols have data,
    /// `NoCommonTimeline` when the intersection (after quality filtering)
    /// is empty, and `Series` on store failures.
    pub async fn build_timeline(
        &self,
        symbols: &[String],
        resolution: Resolution,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Timeline, TimelineError> {
        info!(
            symbols = symbols.len(),
            resolution = %resolution,
            start = %start,
            end = %end,
            "Building timeline"
        );

        let mut per_symbol: HashMap<String, HashMap<DateTime<Utc>, SeriesPoint>> = HashMap::new();
        let mut excluded = Vec::new();

        for symbol in symbols {
            let bars = self
                .store
                .get_bars(symbol, resolution, start, end)
                .await?;

            if bars.is_empty() {
                warn!(symbol = %symbol, "No data in range; excluding symbol from timeline");
                excluded.push(symbol.clone());
                continue;
            }

            debug!(symbol = %symbol, bars = bars.len(), "Loaded bars");
            per_symbol.insert(
                symbol.clone(),
                bars.into_iter().map(|b| (b.timestamp, b)).collect(),
            );
        }

        if per_symbol.len() < 2 {
            return Err(TimelineError::DataUnavailable {
                usable: per_symbol.len(),
                requested: symbols.len(),
            });
        }

        let mut participating: Vec<String> = per_symbol.keys().cloned().collect();
        participating.sort();

        // Intersection: a timestamp is usable only if every participating
        // symbol has a bar at it.
        let mut candidates: Option<BTreeSet<DateTime<Utc>>> = None;
        for symbol in &participating {
            let stamps: BTreeSet<DateTime<Utc>> =
                per_symbol[symbol].keys().copied().collect();
            candidates = Some(match candidates {
                None => stamps,
                Some(acc) => acc.intersection(&stamps).copied().collect(),
            });
        }
        let candidates = candidates.unwrap_or_default();

        if candidates.is_empty() {
            return Err(TimelineError::NoCommonTimeline);
        }

        let candidate_count = candidates.len();
        let mut points = Vec::new();
        for timestamp in candidates {
            let bars: Vec<Option<&SeriesPoint>> = participating
                .iter()
                .map(|s| per_symbol[s].get(&timestamp))
                .collect();
            let score = quality_score(&bars);

            if score >= self.min_data_quality {
                points.push(SyncPoint {
                    timestamp,
                    cycle_id: points.len() as u64,
                    quality_score: score,
                });
            } else {
                debug!(
                    timestamp = %timestamp,
                    quality = score,
                    threshold = self.min_data_quality,
                    "Dropping low-quality timestamp"
                );
            }
        }

        if points.is_empty() {
            return Err(TimelineError::NoCommonTimeline);
        }

        info!(
            retained = points.len(),
            candidates = candidate_count,
            excluded = excluded.len(),
            "Timeline built"
        );

        Ok(Timeline {
            symbols: participating,
            excluded_symbols: excluded,
            resolution,
            points,
            candidate_count,
        })
    }
}
