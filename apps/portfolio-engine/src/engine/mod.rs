//! The cycle engine: sequential cycle processing, checkpoints, retention.

mod checkpoint;
mod cycle;
mod retention;
mod strategy;
mod types;

pub use checkpoint::{
    Checkpoint, CheckpointError, CheckpointStore, InMemoryCheckpointStore, JsonFileCheckpointStore,
};
pub use cycle::CycleEngine;
pub use retention::{EvictionOutcome, MemoryStatus, RetentionManager, RetentionPolicy};
pub use strategy::{
    ConfidenceTier, EvaluationError, MarketRegime, StrategyEvaluator, TradeAction, TradeRecord,
};
pub use types::{CancelToken, CycleResult, EngineProgress, EngineState};
