//! Per-symbol price series: bar types, store contract, data quality.

mod quality;
mod store;
mod types;

pub use quality::{
    BarDefect, QUALITY_ABSENT, QUALITY_CLEAN, QUALITY_DEGRADED, bar_quality, inspect_bar,
};
pub use store::{InMemorySeriesStore, SeriesError, SeriesStore};
pub use types::{Resolution, SeriesPoint};
