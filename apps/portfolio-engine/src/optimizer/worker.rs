//! Runs optimizations off the async runtime's core threads.

use tracing::debug;

use super::solver::{OptimizerError, optimize};
use super::types::{OptimizationRequest, OptimizationResult};

/// Run an optimization on a blocking worker thread.
///
/// Matrix work on large universes can hold a core thread for milliseconds;
/// `spawn_blocking` keeps cycle processing responsive.
///
/// # Errors
///
/// `OptimizerError` from the solver, or `Worker` when the blocking task
/// itself fails.
pub async fn optimize_on_worker(
    request: OptimizationRequest,
) -> Result<OptimizationResult, OptimizerError> {
    debug!(
        method = %request.method,
        symbols = request.symbols.len(),
        "Dispatching optimization to worker"
    );
    tokio::task::spawn_blocking(move || optimize(&request))
        .await
        .map_err(|e| OptimizerError::Worker(e.to_string()))?
}
