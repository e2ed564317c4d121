//! Timeline synchronization across heterogeneous per-symbol series.

mod synchronizer;
mod types;

pub use synchronizer::{TimelineError, TimelineSynchronizer, quality_score};
pub use types::{SyncPoint, Timeline};
