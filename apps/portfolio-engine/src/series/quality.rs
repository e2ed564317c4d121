//! Per-bar data quality scoring.
//!
//! Every bar gets a score in `[0, 1]`:
//!
//! - `1.0` — present and passes all OHLC sanity checks with volume reported
//! - `0.5` — present but degraded: volume missing/zero, or a single minor
//!   range anomaly (open/close outside `[low, high]` by at most 0.1%)
//! - `0.0` — absent, non-positive prices, high below low, or more than one
//!   degradation

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use super::types::SeriesPoint;

/// Score for a bar that is fully present and sane.
pub const QUALITY_CLEAN: f64 = 1.0;
/// Score for a bar with exactly one minor degradation.
pub const QUALITY_DEGRADED: f64 = 0.5;
/// Score for an absent or unusable bar.
pub const QUALITY_ABSENT: f64 = 0.0;

/// Relative tolerance under which an open/close range violation counts as
/// a minor anomaly rather than an invalid bar.
const MINOR_ANOMALY_TOLERANCE: f64 = 0.001;

/// A specific defect found in a bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BarDefect {
    /// One of open/high/low/close is zero or negative.
    NonPositivePrice,
    /// High price below low price.
    HighBelowLow,
    /// Open price outside the `[low, high]` range.
    OpenOutOfRange,
    /// Close price outside the `[low, high]` range.
    CloseOutOfRange,
    /// Volume field absent.
    VolumeMissing,
    /// Volume reported as zero.
    VolumeZero,
    /// Volume reported as negative.
    VolumeNegative,
}

impl std::fmt::Display for BarDefect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositivePrice => write!(f, "NON_POSITIVE_PRICE"),
            Self::HighBelowLow => write!(f, "HIGH_BELOW_LOW"),
            Self::OpenOutOfRange => write!(f, "OPEN_OUT_OF_RANGE"),
            Self::CloseOutOfRange => write!(f, "CLOSE_OUT_OF_RANGE"),
            Self::VolumeMissing => write!(f, "VOLUME_MISSING"),
            Self::VolumeZero => write!(f, "VOLUME_ZERO"),
            Self::VolumeNegative => write!(f, "VOLUME_NEGATIVE"),
        }
    }
}

/// Inspect a bar and list every defect found.
#[must_use]
pub fn inspect_bar(bar: &SeriesPoint) -> Vec<BarDefect> {
    let mut defects = Vec::new();

    if bar.open <= Decimal::ZERO
        || bar.high <= Decimal::ZERO
        || bar.low <= Decimal::ZERO
        || bar.close <= Decimal::ZERO
    {
        defects.push(BarDefect::NonPositivePrice);
        return defects;
    }

    if bar.high < bar.low {
        defects.push(BarDefect::HighBelowLow);
        return defects;
    }

    if bar.open < bar.low || bar.open > bar.high {
        defects.push(BarDefect::OpenOutOfRange);
    }
    if bar.close < bar.low || bar.close > bar.high {
        defects.push(BarDefect::CloseOutOfRange);
    }

    match bar.volume {
        None => defects.push(BarDefect::VolumeMissing),
        Some(v) if v < Decimal::ZERO => defects.push(BarDefect::VolumeNegative),
        Some(v) if v == Decimal::ZERO => defects.push(BarDefect::VolumeZero),
        Some(_) => {}
    }

    defects
}

/// Relative magnitude of a range violation for `price` against `[low, high]`.
fn range_violation_magnitude(price: Decimal, low: Decimal, high: Decimal) -> f64 {
    let excess = if price < low {
        low - price
    } else if price > high {
        price - high
    } else {
        Decimal::ZERO
    };
    let span = high.max(Decimal::ONE);
    (excess / span).to_f64().unwrap_or(f64::INFINITY)
}

/// Score a single bar in `[0, 1]`.
///
/// Pure function of the bar only; the absent case (`None`) scores 0.0 so
/// callers can fold per-symbol scores without special-casing gaps.
#[must_use]
pub fn bar_quality(bar: Option<&SeriesPoint>) -> f64 {
    let Some(bar) = bar else {
        return QUALITY_ABSENT;
    };

    let defects = inspect_bar(bar);
    if defects.is_empty() {
        return QUALITY_CLEAN;
    }

    let mut degradations = 0usize;
    for defect in &defects {
        match defect {
            BarDefect::NonPositivePrice | BarDefect::HighBelowLow | BarDefect::VolumeNegative => {
                return QUALITY_ABSENT;
            }
            BarDefect::OpenOutOfRange => {
                if range_violation_magnitude(bar.open, bar.low, bar.high)
                    > MINOR_ANOMALY_TOLERANCE
                {
                    return QUALITY_ABSENT;
                }
                degradations += 1;
            }
            BarDefect::CloseOutOfRange => {
                if range_violation_magnitude(bar.close, bar.low, bar.high)
                    > MINOR_ANOMALY_TOLERANCE
                {
                    return QUALITY_ABSENT;
                }
                degradations += 1;
            }
            BarDefect::VolumeMissing | BarDefect::VolumeZero => degradations += 1,
        }
    }

    if degradations == 1 {
        QUALITY_DEGRADED
    } else {
        QUALITY_ABSENT
    }
}
