//! Top-level engine error taxonomy.

use thiserror::Error;

use crate::timeline::TimelineError;

/// Fatal errors that abort a session.
///
/// Per-symbol evaluation failures and checkpoint write failures are
/// handled inside the engine and never surface here.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Timeline could not be built.
    #[error(transparent)]
    Timeline(#[from] TimelineError),

    /// Timeline violated an ordering invariant mid-run.
    #[error("Corrupt timeline at cycle {cycle_id}: {message}")]
    CorruptTimeline {
        /// Cycle at which the violation was detected.
        cycle_id: u64,
        /// What was violated.
        message: String,
    },

    /// Unrecoverable runtime failure.
    #[error(
        "Fatal engine failure after cycle {last_cycle} \
         (last checkpoint: {checkpoint_cycle:?}): {message}"
    )]
    Fatal {
        /// Last cycle that completed before the failure.
        last_cycle: u64,
        /// Last checkpointed cycle, for resume.
        checkpoint_cycle: Option<u64>,
        /// Failure description.
        message: String,
    },
}
