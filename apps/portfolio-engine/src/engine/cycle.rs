//! Sequential cycle processing with bounded within-cycle parallelism.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::metrics::MetricsAggregator;
use crate::report::MetricsSink;
use crate::series::{SeriesPoint, SeriesStore};
use crate::timeline::{SyncPoint, Timeline};

use super::checkpoint::{Checkpoint, CheckpointStore};
use super::retention::RetentionManager;
use super::strategy::{StrategyEvaluator, TradeRecord};
use super::types::{CancelToken, CycleResult, EngineProgress, EngineState};

/// Smoothing factor for the rolling strategy performance index.
const PERFORMANCE_EWMA_ALPHA: f64 = 0.1;

/// Drives a timeline cycle by cycle.
///
/// Cycles run strictly sequentially; within a cycle, per-symbol
/// evaluations fan out up to the configured concurrency. Cumulative state
/// (balances, trade counts, performance index) is only touched between
/// cycles, so no locking is needed on the hot path.
pub struct CycleEngine {
    config: EngineConfig,
    store: Arc<dyn SeriesStore>,
    evaluator: Arc<dyn StrategyEvaluator>,
    checkpoints: Arc<dyn CheckpointStore>,
    sink: Arc<dyn MetricsSink>,
    session_id: String,
    state: EngineState,
    retention: RetentionManager,
    aggregator: MetricsAggregator,
    cumulative_balances: HashMap<String, Decimal>,
    cumulative_trade_counts: HashMap<String, u64>,
    strategy_performance_index: f64,
    checkpoint_cycle: Option<u64>,
    completed_cycles: u64,
    total_cycles: u64,
    resume_after: Option<u64>,
    started: Option<Instant>,
}

impl std::fmt::Debug for CycleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleEngine")
            .field("session_id", &self.session_id)
            .field("state", &self.state)
            .field("completed_cycles", &self.completed_cycles)
            .field("checkpoint_cycle", &self.checkpoint_cycle)
            .finish_non_exhaustive()
    }
}

impl CycleEngine {
    /// Create an engine with a fresh session id.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn SeriesStore>,
        evaluator: Arc<dyn StrategyEvaluator>,
        checkpoints: Arc<dyn CheckpointStore>,
        sink: Arc<dyn MetricsSink>,
    ) -> Self {
        let retention = RetentionManager::new(config.retention.clone());
        let aggregator = MetricsAggregator::new(config.history_capacity);
        Self {
            config,
            store,
            evaluator,
            checkpoints,
            sink,
            session_id: Uuid::new_v4().to_string(),
            state: EngineState::Idle,
            retention,
            aggregator,
            cumulative_balances: HashMap::new(),
            cumulative_trade_counts: HashMap::new(),
            strategy_performance_index: 0.0,
            checkpoint_cycle: None,
            completed_cycles: 0,
            total_cycles: 0,
            resume_after: None,
            started: None,
        }
    }

    /// Session id of this engine instance.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> EngineState {
        self.state
    }

    /// Cumulative per-symbol balances after the last completed cycle.
    #[must_use]
    pub const fn balances(&self) -> &HashMap<String, Decimal> {
        &self.cumulative_balances
    }

    /// Cumulative per-symbol trade counts after the last completed cycle.
    #[must_use]
    pub const fn trade_counts(&self) -> &HashMap<String, u64> {
        &self.cumulative_trade_counts
    }

    /// Rolling strategy performance index.
    #[must_use]
    pub const fn performance_index(&self) -> f64 {
        self.strategy_performance_index
    }

    /// Cycle results still retained in memory, oldest first.
    #[must_use]
    pub fn retained_results(&self) -> impl Iterator<Item = &CycleResult> {
        self.retention.retained().iter()
    }

    /// Aggregated metrics history built up during the run.
    #[must_use]
    pub const fn metrics(&self) -> &MetricsAggregator {
        &self.aggregator
    }

    /// Point-in-time progress snapshot.
    #[must_use]
    pub fn progress(&self) -> EngineProgress {
        EngineProgress {
            session_id: self.session_id.clone(),
            state: self.state,
            completed_cycles: self.completed_cycles,
            total_cycles: self.total_cycles,
            checkpoint_cycle: self.checkpoint_cycle,
            retained_bytes: self.retention.estimated_bytes(),
            elapsed: self.started.map_or(Duration::ZERO, |s| s.elapsed()),
        }
    }

    /// Restore cumulative state from a checkpoint and skip already-covered
    /// cycles on the next `run`.
    pub async fn resume_from_latest(&mut self, session_id: &str) -> Result<bool, EngineError> {
        let checkpoint = self
            .checkpoints
            .load_latest(session_id)
            .await
            .map_err(|e| EngineError::Fatal {
                last_cycle: self.completed_cycles,
                checkpoint_cycle: self.checkpoint_cycle,
                message: format!("checkpoint load failed: {e}"),
            })?;

        let Some(checkpoint) = checkpoint else {
            debug!(session_id = %session_id, "No checkpoint to resume from");
            return Ok(false);
        };

        info!(
            session_id = %session_id,
            cycle_id = checkpoint.cycle_id,
            "Resuming from checkpoint"
        );
        self.session_id = checkpoint.session_id;
        self.cumulative_balances = checkpoint.cumulative_balances;
        self.cumulative_trade_counts = checkpoint.cumulative_trade_counts;
        self.strategy_performance_index = checkpoint.strategy_performance_index;
        self.checkpoint_cycle = Some(checkpoint.cycle_id);
        self.completed_cycles = checkpoint.cycle_id + 1;
        self.resume_after = Some(checkpoint.cycle_id);
        Ok(true)
    }

    /// Process a timeline to completion, cancellation, or fatal error.
    ///
    /// Returns the terminal state (`Completed` or `Paused`).
    ///
    /// # Errors
    ///
    /// `CorruptTimeline` when ordering invariants fail; `Fatal` on
    /// unrecoverable runtime failures. Per-symbol evaluation failures and
    /// checkpoint write failures are absorbed, not returned.
    pub async fn run(
        &mut self,
        timeline: &Timeline,
        cancel: &CancelToken,
    ) -> Result<EngineState, EngineError> {
        if let Err(e) = Self::validate_timeline(timeline) {
            self.state = EngineState::Failed;
            return Err(e);
        }

        self.state = EngineState::Running;
        self.started = Some(Instant::now());
        self.total_cycles = timeline.len() as u64;
        let concurrency = self.config.effective_concurrency(timeline.symbols.len());
        let semaphore = Arc::new(Semaphore::new(concurrency));

        info!(
            session_id = %self.session_id,
            cycles = timeline.len(),
            symbols = timeline.symbols.len(),
            concurrency = concurrency,
            "Starting cycle run"
        );

        let bars_by_symbol = match self.prefetch_bars(timeline).await {
            Ok(bars) => bars,
            Err(e) => {
                error!(session_id = %self.session_id, error = %e, "Fatal prefetch failure");
                self.state = EngineState::Failed;
                return Err(e);
            }
        };

        for point in &timeline.points {
            if let Some(boundary) = self.resume_after {
                if point.cycle_id <= boundary {
                    continue;
                }
            }

            if cancel.is_cancelled() {
                info!(
                    session_id = %self.session_id,
                    cycle_id = point.cycle_id,
                    "Stop requested; pausing at cycle boundary"
                );
                self.save_checkpoint_forced().await;
                self.state = EngineState::Paused;
                return Ok(self.state);
            }

            let result = self
                .run_cycle(timeline, *point, &bars_by_symbol, &semaphore)
                .await;

            // Aggregate against the balances as they stood before this
            // cycle, then fold the cycle in.
            let metrics = self.aggregator.aggregate(&result, &self.cumulative_balances);
            self.apply_cycle(&result);
            self.sink.publish(&metrics);
            self.retention.push(result);
            self.completed_cycles += 1;

            // The ceiling holds after every cycle; the interval pass below
            // is a backstop.
            self.retention.evict(self.checkpoint_cycle);
            if self.retention.is_cleanup_due(point.cycle_id) {
                self.retention.evict(self.checkpoint_cycle);
            }

            if self.config.checkpoint_interval > 0
                && (point.cycle_id + 1) % self.config.checkpoint_interval == 0
            {
                self.save_checkpoint(point.cycle_id).await;
            }
        }

        self.save_checkpoint_forced().await;
        self.state = EngineState::Completed;
        info!(
            session_id = %self.session_id,
            completed = self.completed_cycles,
            "Cycle run complete"
        );
        Ok(self.state)
    }

    fn validate_timeline(timeline: &Timeline) -> Result<(), EngineError> {
        for pair in timeline.points.windows(2) {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(EngineError::CorruptTimeline {
                    cycle_id: pair[1].cycle_id,
                    message: format!(
                        "timestamp {} does not advance past {}",
                        pair[1].timestamp, pair[0].timestamp
                    ),
                });
            }
        }
        Ok(())
    }

    async fn prefetch_bars(
        &self,
        timeline: &Timeline,
    ) -> Result<HashMap<String, Arc<Vec<SeriesPoint>>>, EngineError> {
        let Some((start, end)) = timeline.span() else {
            return Ok(HashMap::new());
        };

        let mut bars_by_symbol = HashMap::new();
        for symbol in &timeline.symbols {
            let bars = self
                .store
                .get_bars(symbol, timeline.resolution, start, end)
                .await
                .map_err(|e| EngineError::Fatal {
                    last_cycle: self.completed_cycles,
                    checkpoint_cycle: self.checkpoint_cycle,
                    message: format!("bar prefetch failed for {symbol}: {e}"),
                })?;
            bars_by_symbol.insert(symbol.clone(), Arc::new(bars));
        }
        Ok(bars_by_symbol)
    }

    /// Evaluate every symbol at one sync point.
    ///
    /// A failed or panicked evaluation is isolated: the symbol gets an
    /// empty trade list and lands in `excluded_symbols`, and the cycle
    /// still completes.
    async fn run_cycle(
        &self,
        timeline: &Timeline,
        point: SyncPoint,
        bars_by_symbol: &HashMap<String, Arc<Vec<SeriesPoint>>>,
        semaphore: &Arc<Semaphore>,
    ) -> CycleResult {
        let started = Instant::now();
        let mut tasks = JoinSet::new();

        for symbol in &timeline.symbols {
            let symbol = symbol.clone();
            let evaluator = Arc::clone(&self.evaluator);
            let semaphore = Arc::clone(semaphore);
            let bars = bars_by_symbol.get(&symbol).cloned().unwrap_or_default();

            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (symbol, Err("concurrency limiter closed".to_string()));
                    }
                };

                // Only bars at or before the sync point are visible.
                let visible = bars.partition_point(|b| b.timestamp <= point.timestamp);
                let window = bars[..visible].to_vec();

                match evaluator.evaluate(&symbol, window, point).await {
                    Ok(trades) => (symbol, Ok(trades)),
                    Err(e) => (symbol, Err(e.to_string())),
                }
            });
        }

        let mut per_symbol: HashMap<String, Vec<TradeRecord>> = HashMap::new();
        let mut excluded = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((symbol, Ok(trades))) => {
                    per_symbol.insert(symbol, trades);
                }
                Ok((symbol, Err(message))) => {
                    warn!(
                        symbol = %symbol,
                        cycle_id = point.cycle_id,
                        error = %message,
                        "Evaluation failed; isolating symbol for this cycle"
                    );
                    per_symbol.insert(symbol.clone(), Vec::new());
                    excluded.push(symbol);
                }
                Err(join_err) => {
                    // Panicked task: the symbol is lost for this cycle but
                    // the cycle itself survives.
                    error!(
                        cycle_id = point.cycle_id,
                        error = %join_err,
                        "Evaluation task aborted"
                    );
                }
            }
        }
        excluded.sort();

        let memory_bytes = CycleResult::estimate_bytes(&per_symbol);
        debug!(
            cycle_id = point.cycle_id,
            trades = per_symbol.values().map(Vec::len).sum::<usize>(),
            excluded = excluded.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Cycle complete"
        );

        CycleResult {
            cycle_id: point.cycle_id,
            sync_timestamp: point.timestamp,
            per_symbol,
            excluded_symbols: excluded,
            processing: started.elapsed(),
            memory_bytes,
        }
    }

    /// Fold one cycle's trades into cumulative state. Runs between cycles
    /// only.
    fn apply_cycle(&mut self, result: &CycleResult) {
        let mut wins = 0_usize;
        let mut total = 0_usize;

        for (symbol, trades) in &result.per_symbol {
            if trades.is_empty() {
                continue;
            }
            let pnl: Decimal = trades.iter().map(|t| t.pnl).sum();
            *self
                .cumulative_balances
                .entry(symbol.clone())
                .or_insert(Decimal::ZERO) += pnl;
            *self
                .cumulative_trade_counts
                .entry(symbol.clone())
                .or_insert(0) += trades.len() as u64;

            total += trades.len();
            wins += trades.iter().filter(|t| t.was_successful).count();
        }

        if total > 0 {
            let cycle_win_rate = wins as f64 / total as f64;
            self.strategy_performance_index = (1.0 - PERFORMANCE_EWMA_ALPHA)
                * self.strategy_performance_index
                + PERFORMANCE_EWMA_ALPHA * cycle_win_rate;
        }
    }

    /// Write a checkpoint at `cycle_id`; failure is logged and absorbed,
    /// leaving the previous checkpoint in place for the next attempt.
    async fn save_checkpoint(&mut self, cycle_id: u64) {
        let checkpoint = Checkpoint {
            session_id: self.session_id.clone(),
            cycle_id,
            cumulative_balances: self.cumulative_balances.clone(),
            cumulative_trade_counts: self.cumulative_trade_counts.clone(),
            strategy_performance_index: self.strategy_performance_index,
            created_at: Utc::now(),
        };

        match self.checkpoints.save(&checkpoint).await {
            Ok(()) => {
                debug!(cycle_id = cycle_id, "Checkpoint written");
                self.checkpoint_cycle = Some(cycle_id);
            }
            Err(e) => {
                warn!(
                    cycle_id = cycle_id,
                    error = %e,
                    "Checkpoint write failed; will retry at next boundary"
                );
            }
        }
    }

    /// Checkpoint the last completed cycle regardless of cadence. Used on
    /// pause and on completion.
    async fn save_checkpoint_forced(&mut self) {
        if self.completed_cycles == 0 {
            return;
        }
        let last_cycle = self.completed_cycles - 1;
        if self.checkpoint_cycle == Some(last_cycle) {
            return;
        }
        self.save_checkpoint(last_cycle).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal_macros::dec;

    use crate::engine::checkpoint::{CheckpointError, InMemoryCheckpointStore};
    use crate::engine::retention::RetentionPolicy;
    use crate::engine::strategy::{
        ConfidenceTier, EvaluationError, MarketRegime, TradeAction,
    };
    use crate::report::{ChannelSink, NoOpSink};
    use crate::series::{InMemorySeriesStore, Resolution};
    use crate::timeline::TimelineSynchronizer;

    use super::*;

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    fn clean_bar(hour: u32) -> SeriesPoint {
        SeriesPoint::new(ts(hour), dec!(100), dec!(101), dec!(99), dec!(100.5), dec!(1000))
    }

    /// Produces one winning one-unit trade per cycle, except for symbols in
    /// `fail_symbols` which always error.
    struct FixedEvaluator {
        fail_symbols: Vec<String>,
    }

    #[async_trait]
    impl StrategyEvaluator for FixedEvaluator {
        async fn evaluate(
            &self,
            symbol: &str,
            bars: Vec<SeriesPoint>,
            sync_point: SyncPoint,
        ) -> Result<Vec<TradeRecord>, EvaluationError> {
            if self.fail_symbols.iter().any(|s| s == symbol) {
                return Err(EvaluationError::Strategy {
                    symbol: symbol.to_string(),
                    message: "induced failure".to_string(),
                });
            }
            assert!(!bars.is_empty());
            assert!(bars.iter().all(|b| b.timestamp <= sync_point.timestamp));

            Ok(vec![TradeRecord {
                symbol: symbol.to_string(),
                cycle_id: sync_point.cycle_id,
                action: TradeAction::Long,
                entry_price: dec!(100),
                exit_price: dec!(101),
                quantity: dec!(1),
                leverage: dec!(1),
                entry_time: sync_point.timestamp,
                exit_time: sync_point.timestamp,
                pnl: dec!(1),
                pnl_pct: dec!(1),
                strategy_tag: "fixed".to_string(),
                confidence_tier: ConfidenceTier::Medium,
                market_regime_tag: MarketRegime::Ranging,
                quality_score: sync_point.quality_score,
                was_successful: true,
            }])
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    async fn seeded_timeline(
        hours: std::ops::Range<u32>,
    ) -> (Arc<InMemorySeriesStore>, Timeline) {
        let store = Arc::new(InMemorySeriesStore::new());
        for symbol in ["A", "B"] {
            store
                .add_series(
                    symbol,
                    Resolution::H1,
                    hours.clone().map(clean_bar).collect(),
                )
                .await;
        }

        let sync = TimelineSynchronizer::new(Arc::clone(&store) as Arc<dyn SeriesStore>, 0.8);
        let timeline = sync
            .build_timeline(
                &["A".to_string(), "B".to_string()],
                Resolution::H1,
                ts(0),
                ts(23),
            )
            .await
            .unwrap();
        (store, timeline)
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            symbols: vec!["A".to_string(), "B".to_string()],
            resolution: Resolution::H1,
            checkpoint_interval: 2,
            ..EngineConfig::default()
        }
    }

    async fn setup(
        hours: std::ops::Range<u32>,
        fail_symbols: Vec<String>,
    ) -> (CycleEngine, Timeline) {
        let (store, timeline) = seeded_timeline(hours).await;
        let engine = CycleEngine::new(
            test_config(),
            store,
            Arc::new(FixedEvaluator { fail_symbols }),
            Arc::new(InMemoryCheckpointStore::new()),
            Arc::new(NoOpSink),
        );
        (engine, timeline)
    }

    #[tokio::test]
    async fn processes_every_cycle_in_order() {
        let (mut engine, timeline) = setup(9..13, Vec::new()).await;
        let cancel = CancelToken::new();

        let state = engine.run(&timeline, &cancel).await.unwrap();
        assert_eq!(state, EngineState::Completed);

        let ids: Vec<u64> = engine.retained_results().map(|r| r.cycle_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert_eq!(engine.balances()["A"], dec!(4));
        assert_eq!(engine.trade_counts()["B"], 4);
    }

    #[tokio::test]
    async fn failed_symbol_is_isolated_per_cycle() {
        let (mut engine, timeline) = setup(9..11, vec!["B".to_string()]).await;
        let cancel = CancelToken::new();

        engine.run(&timeline, &cancel).await.unwrap();

        for result in engine.retained_results() {
            assert_eq!(result.excluded_symbols, vec!["B".to_string()]);
            assert!(result.per_symbol["B"].is_empty());
            assert_eq!(result.per_symbol["A"].len(), 1);
        }
        assert_eq!(engine.balances().get("B"), None);
        assert_eq!(engine.balances()["A"], dec!(2));
    }

    #[tokio::test]
    async fn cancellation_pauses_at_boundary_with_checkpoint() {
        let (mut engine, timeline) = setup(9..13, Vec::new()).await;
        let cancel = CancelToken::new();
        cancel.cancel();

        let state = engine.run(&timeline, &cancel).await.unwrap();
        assert_eq!(state, EngineState::Paused);
        assert_eq!(engine.progress().completed_cycles, 0);
    }

    #[tokio::test]
    async fn checkpoints_follow_interval_and_completion() {
        let (mut engine, timeline) = setup(9..13, Vec::new()).await;
        let cancel = CancelToken::new();
        let checkpoints = Arc::clone(&engine.checkpoints);

        engine.run(&timeline, &cancel).await.unwrap();

        let latest = checkpoints
            .load_latest(engine.session_id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.cycle_id, 3);
        assert_eq!(latest.cumulative_balances["A"], dec!(4));
    }

    #[tokio::test]
    async fn resume_skips_checkpointed_cycles() {
        let (mut engine, timeline) = setup(9..13, Vec::new()).await;
        let cancel = CancelToken::new();
        engine.run(&timeline, &cancel).await.unwrap();
        let session = engine.session_id().to_string();
        let final_balances = engine.balances().clone();
        let checkpoints = Arc::clone(&engine.checkpoints);

        // Fresh engine, same stores: simulate a restart after cycle 1.
        let (mut resumed, _) = setup(9..13, Vec::new()).await;
        resumed.checkpoints = Arc::clone(&checkpoints);
        // Overwrite with the mid-run snapshot.
        checkpoints
            .save(&Checkpoint {
                session_id: session.clone(),
                cycle_id: 1,
                cumulative_balances: HashMap::from([
                    ("A".to_string(), dec!(2)),
                    ("B".to_string(), dec!(2)),
                ]),
                cumulative_trade_counts: HashMap::from([
                    ("A".to_string(), 2),
                    ("B".to_string(), 2),
                ]),
                strategy_performance_index: 0.19,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        assert!(resumed.resume_from_latest(&session).await.unwrap());
        resumed.run(&timeline, &cancel).await.unwrap();

        assert_eq!(resumed.balances(), &final_balances);
        let ids: Vec<u64> = resumed.retained_results().map(|r| r.cycle_id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[tokio::test]
    async fn corrupt_timeline_is_rejected() {
        let (mut engine, mut timeline) = setup(9..12, Vec::new()).await;
        timeline.points[2].timestamp = timeline.points[0].timestamp;
        let cancel = CancelToken::new();

        let result = engine.run(&timeline, &cancel).await;
        assert!(matches!(
            result,
            Err(EngineError::CorruptTimeline { cycle_id: 2, .. })
        ));
    }

    #[tokio::test]
    async fn memory_ceiling_holds_between_cleanup_intervals() {
        let (store, timeline) = seeded_timeline(9..18).await;
        let config = EngineConfig {
            retention: RetentionPolicy {
                memory_ceiling_bytes: 2_500,
                min_retained_cycles: 1,
                cleanup_interval: 10,
            },
            ..test_config()
        };
        let mut engine = CycleEngine::new(
            config,
            store,
            Arc::new(FixedEvaluator { fail_symbols: Vec::new() }),
            Arc::new(InMemoryCheckpointStore::new()),
            Arc::new(NoOpSink),
        );
        let cancel = CancelToken::new();

        engine.run(&timeline, &cancel).await.unwrap();

        // 9 cycles never reach the cleanup interval of 10; the ceiling
        // must hold anyway.
        assert!(engine.progress().retained_bytes <= 2_500);
        assert!(engine.retained_results().count() < 9);
    }

    #[tokio::test]
    async fn publishes_aggregated_metrics_each_cycle() {
        let (store, timeline) = seeded_timeline(9..13).await;
        let (sink, mut rx) = ChannelSink::new(16);
        let mut engine = CycleEngine::new(
            test_config(),
            store,
            Arc::new(FixedEvaluator { fail_symbols: Vec::new() }),
            Arc::new(InMemoryCheckpointStore::new()),
            Arc::new(sink),
        );
        let cancel = CancelToken::new();

        engine.run(&timeline, &cancel).await.unwrap();

        let mut published = Vec::new();
        while let Ok(metrics) = rx.try_recv() {
            published.push(metrics);
        }
        let ids: Vec<u64> = published.iter().map(|m| m.cycle_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        for metrics in &published {
            assert_eq!(metrics.total_pnl, dec!(2));
            assert_eq!(metrics.trade_count, 2);
        }
        // Cycle 0 has no prior balance; cycle 1 earns 2 on a balance of 2.
        assert_eq!(published[0].portfolio_return_pct, 0.0);
        assert!((published[1].portfolio_return_pct - 1.0).abs() < 1e-12);

        assert_eq!(engine.metrics().snapshots().len(), 4);
    }

    /// Fails the first `failures_left` saves, then delegates.
    struct FlakyCheckpointStore {
        inner: InMemoryCheckpointStore,
        failures_left: AtomicU64,
    }

    #[async_trait]
    impl CheckpointStore for FlakyCheckpointStore {
        async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(CheckpointError::Write("induced write failure".to_string()));
            }
            self.inner.save(checkpoint).await
        }

        async fn load_latest(
            &self,
            session_id: &str,
        ) -> Result<Option<Checkpoint>, CheckpointError> {
            self.inner.load_latest(session_id).await
        }
    }

    #[tokio::test]
    async fn checkpoint_write_failures_are_absorbed_and_retried() {
        let (store, timeline) = seeded_timeline(9..13).await;
        let checkpoints = Arc::new(FlakyCheckpointStore {
            inner: InMemoryCheckpointStore::new(),
            failures_left: AtomicU64::new(2),
        });
        let mut engine = CycleEngine::new(
            test_config(),
            store,
            Arc::new(FixedEvaluator { fail_symbols: Vec::new() }),
            Arc::clone(&checkpoints) as Arc<dyn CheckpointStore>,
            Arc::new(NoOpSink),
        );
        let cancel = CancelToken::new();

        // The interval writes after cycles 1 and 3 both fail. No checkpoint
        // exists yet, so nothing regresses, and the forced write on
        // completion retries cycle 3 and succeeds.
        let state = engine.run(&timeline, &cancel).await.unwrap();
        assert_eq!(state, EngineState::Completed);
        assert_eq!(engine.progress().checkpoint_cycle, Some(3));

        let latest = checkpoints
            .load_latest(engine.session_id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.cycle_id, 3);
        assert_eq!(latest.cumulative_balances["A"], dec!(4));
    }
}
