//! In-memory retention of cycle results under a byte ceiling.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::types::CycleResult;

/// How full the retention buffer is relative to its ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemoryStatus {
    /// Under 70% of the ceiling.
    Ok,
    /// Between 70% and 90% of the ceiling.
    Warning,
    /// At or above 90% of the ceiling.
    Critical,
}

impl std::fmt::Display for MemoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Warning => write!(f, "WARNING"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Retention limits for buffered cycle results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Ceiling on estimated bytes held by retained cycle results.
    pub memory_ceiling_bytes: usize,
    /// Floor on retained cycles regardless of the ceiling.
    pub min_retained_cycles: usize,
    /// Run eviction every this many cycles.
    pub cleanup_interval: u64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            memory_ceiling_bytes: 256 * 1024 * 1024,
            min_retained_cycles: 10,
            cleanup_interval: 50,
        }
    }
}

/// Outcome of one eviction pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionOutcome {
    /// Cycles dropped in this pass.
    pub evicted: usize,
    /// Estimated bytes reclaimed.
    pub bytes_reclaimed: usize,
    /// Status after the pass.
    pub status: MemoryStatus,
}

/// FIFO buffer of cycle results bounded by an estimated byte ceiling.
///
/// Eviction drops oldest-first but never drops below the policy's retained
/// floor and never drops cycles newer than the last checkpoint boundary,
/// so a resume always has its trailing window intact.
#[derive(Debug)]
pub struct RetentionManager {
    policy: RetentionPolicy,
    buffer: VecDeque<CycleResult>,
    estimated_bytes: usize,
}

impl RetentionManager {
    /// Create an empty manager with the given policy.
    #[must_use]
    pub fn new(policy: RetentionPolicy) -> Self {
        Self {
            policy,
            buffer: VecDeque::new(),
            estimated_bytes: 0,
        }
    }

    /// Buffer a completed cycle.
    pub fn push(&mut self, result: CycleResult) {
        self.estimated_bytes += result.memory_bytes;
        self.buffer.push_back(result);
    }

    /// Estimated bytes currently held.
    #[must_use]
    pub const fn estimated_bytes(&self) -> usize {
        self.estimated_bytes
    }

    /// Number of retained cycles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Retained cycles, oldest first.
    #[must_use]
    pub fn retained(&self) -> &VecDeque<CycleResult> {
        &self.buffer
    }

    /// Current pressure status relative to the ceiling.
    #[must_use]
    pub fn status(&self) -> MemoryStatus {
        let ceiling = self.policy.memory_ceiling_bytes.max(1);
        let ratio = self.estimated_bytes as f64 / ceiling as f64;
        if ratio >= 0.9 {
            MemoryStatus::Critical
        } else if ratio >= 0.7 {
            MemoryStatus::Warning
        } else {
            MemoryStatus::Ok
        }
    }

    /// Whether an eviction pass is due at `cycle_id`.
    #[must_use]
    pub const fn is_cleanup_due(&self, cycle_id: u64) -> bool {
        self.policy.cleanup_interval > 0
            && cycle_id > 0
            && cycle_id % self.policy.cleanup_interval == 0
    }

    /// Evict oldest cycles until under the ceiling.
    ///
    /// `checkpoint_cycle` is the last checkpointed cycle id; cycles after it
    /// are never evicted.
    pub fn evict(&mut self, checkpoint_cycle: Option<u64>) -> EvictionOutcome {
        let mut evicted = 0;
        let mut bytes_reclaimed = 0;

        while self.estimated_bytes > self.policy.memory_ceiling_bytes
            && self.buffer.len() > self.policy.min_retained_cycles
        {
            let oldest_protected = match (checkpoint_cycle, self.buffer.front()) {
                (Some(boundary), Some(front)) => front.cycle_id > boundary,
                _ => false,
            };
            if oldest_protected {
                debug!(
                    checkpoint_cycle = checkpoint_cycle,
                    "Eviction halted at checkpoint boundary"
                );
                break;
            }

            if let Some(dropped) = self.buffer.pop_front() {
                self.estimated_bytes = self.estimated_bytes.saturating_sub(dropped.memory_bytes);
                bytes_reclaimed += dropped.memory_bytes;
                evicted += 1;
            } else {
                break;
            }
        }

        let status = self.status();
        if evicted > 0 {
            info!(
                evicted = evicted,
                bytes_reclaimed = bytes_reclaimed,
                retained = self.buffer.len(),
                status = %status,
                "Evicted cycle results"
            );
        }

        EvictionOutcome {
            evicted,
            bytes_reclaimed,
            status,
        }
    }
}
