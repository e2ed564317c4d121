//! Synchronized multi-series backtesting engine.
//!
//! Builds a quality-filtered master timeline across symbols, drives it
//! cycle by cycle with bounded within-cycle parallelism, aggregates
//! portfolio-level metrics, and allocates portfolio weights.
//!
//! The main pieces:
//!
//! - [`timeline::TimelineSynchronizer`] intersects per-symbol series into
//!   one strictly-increasing sequence of sync points.
//! - [`engine::CycleEngine`] evaluates every symbol at each sync point,
//!   isolating per-symbol failures, checkpointing periodically, and
//!   bounding retained results by a memory ceiling.
//! - [`metrics::MetricsAggregator`] turns cycle results into portfolio
//!   metrics with a bounded snapshot history.
//! - [`optimizer`] allocates weights by equal weight, market cap, risk
//!   parity, or fractional Kelly, with constraint handling and fallbacks.

pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod optimizer;
pub mod report;
pub mod series;
pub mod timeline;

pub use config::EngineConfig;
pub use error::EngineError;
