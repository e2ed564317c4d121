//! Timeline types produced by the synchronizer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::series::Resolution;

/// One aligned, quality-validated point on the master timeline.
///
/// Timestamps are strictly increasing and unique within a timeline;
/// `cycle_id` is the 0-based rank in the retained, sorted sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncPoint {
    /// Aligned timestamp usable by every participating symbol.
    pub timestamp: DateTime<Utc>,
    /// 0-based sequence index within the timeline.
    pub cycle_id: u64,
    /// Mean per-symbol data quality at this timestamp, in `[0, 1]`.
    pub quality_score: f64,
}

/// The master sequence of sync points shared by all symbols.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeline {
    /// Symbols that participate in every sync point.
    pub symbols: Vec<String>,
    /// Requested symbols excluded because their source had no data.
    pub excluded_symbols: Vec<String>,
    /// Bar resolution the timeline was built at.
    pub resolution: Resolution,
    /// Retained sync points, sorted by timestamp ascending.
    pub points: Vec<SyncPoint>,
    /// Number of candidate timestamps before quality filtering.
    pub candidate_count: usize,
}

impl Timeline {
    /// Number of retained sync points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the timeline has no sync points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Fraction of candidate timestamps that survived quality filtering.
    #[must_use]
    pub fn coverage_ratio(&self) -> f64 {
        if self.candidate_count == 0 {
            return 0.0;
        }
        self.points.len() as f64 / self.candidate_count as f64
    }

    /// Timestamp span of the timeline, if non-empty.
    #[must_use]
    pub fn span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => Some((first.timestamp, last.timestamp)),
            _ => None,
        }
    }
}
