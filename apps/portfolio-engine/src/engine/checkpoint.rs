//! Cycle checkpoints: periodic snapshots of cumulative engine state.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

/// Snapshot of cumulative state at a cycle boundary.
///
/// Contains everything needed to resume a session from the cycle after
/// `cycle_id` without replaying earlier cycles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Session the checkpoint belongs to.
    pub session_id: String,
    /// Last fully completed cycle covered by this snapshot.
    pub cycle_id: u64,
    /// Cumulative per-symbol balances after `cycle_id`.
    pub cumulative_balances: HashMap<String, Decimal>,
    /// Cumulative per-symbol trade counts after `cycle_id`.
    pub cumulative_trade_counts: HashMap<String, u64>,
    /// Rolling strategy performance index after `cycle_id`.
    pub strategy_performance_index: f64,
    /// When the snapshot was taken.
    pub created_at: DateTime<Utc>,
}

/// Checkpoint persistence failure.
///
/// Recoverable by design: the engine logs the failure, keeps the previous
/// checkpoint, and retries at the next boundary.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Snapshot could not be written.
    #[error("Checkpoint write failed: {0}")]
    Write(String),

    /// Stored snapshot could not be read back.
    #[error("Checkpoint read failed: {0}")]
    Read(String),

    /// Stored snapshot is not valid JSON or has an incompatible shape.
    #[error("Checkpoint decode failed: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Storage contract for checkpoints.
///
/// Implementations keep at least the latest snapshot per session.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist a snapshot, replacing any older one for the same session.
    ///
    /// # Errors
    ///
    /// `CheckpointError` on persistence failure; callers treat this as
    /// recoverable.
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;

    /// Load the most recent snapshot for a session, if any.
    ///
    /// # Errors
    ///
    /// `CheckpointError` when the store cannot be read or decoded.
    async fn load_latest(&self, session_id: &str) -> Result<Option<Checkpoint>, CheckpointError>;
}

/// In-memory checkpoint store, keyed by session.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    latest: RwLock<HashMap<String, Checkpoint>>,
}

impl InMemoryCheckpointStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let mut latest = self.latest.write().await;
        latest.insert(checkpoint.session_id.clone(), checkpoint.clone());
        Ok(())
    }

    async fn load_latest(&self, session_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let latest = self.latest.read().await;
        Ok(latest.get(session_id).cloned())
    }
}

/// File-backed checkpoint store writing one JSON file per session.
///
/// Writes go to a temporary file first and are renamed into place so a
/// crash mid-write never corrupts the previous snapshot.
#[derive(Debug)]
pub struct JsonFileCheckpointStore {
    dir: PathBuf,
}

impl JsonFileCheckpointStore {
    /// Create a store rooted at `dir`. The directory is created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        // Session ids are caller-chosen; keep filenames safe.
        let safe: String = session_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("checkpoint-{safe}.json"))
    }
}

#[async_trait]
impl CheckpointStore for JsonFileCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CheckpointError::Write(e.to_string()))?;

        let path = self.path_for(&checkpoint.session_id);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(checkpoint)?;

        tokio::fs::write(&tmp, &body)
            .await
            .map_err(|e| CheckpointError::Write(e.to_string()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| CheckpointError::Write(e.to_string()))?;

        debug!(
            session_id = %checkpoint.session_id,
            cycle_id = checkpoint.cycle_id,
            path = %path.display(),
            "Checkpoint saved"
        );
        Ok(())
    }

    async fn load_latest(&self, session_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let path = self.path_for(session_id);
        let body = match tokio::fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CheckpointError::Read(e.to_string())),
        };
        let checkpoint = serde_json::from_slice(&body)?;
        Ok(Some(checkpoint))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn make_checkpoint(session_id: &str, cycle_id: u64) -> Checkpoint {
        Checkpoint {
            session_id: session_id.to_string(),
            cycle_id,
            cumulative_balances: HashMap::from([
                ("BTC".to_string(), dec!(10250.75)),
                ("ETH".to_string(), dec!(9871.20)),
            ]),
            cumulative_trade_counts: HashMap::from([
                ("BTC".to_string(), 42),
                ("ETH".to_string(), 37),
            ]),
            strategy_performance_index: 0.62,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn in_memory_store_keeps_latest_per_session() {
        let store = InMemoryCheckpointStore::new();
        store.save(&make_checkpoint("s1", 100)).await.unwrap();
        store.save(&make_checkpoint("s1", 200)).await.unwrap();
        store.save(&make_checkpoint("s2", 50)).await.unwrap();

        let latest = store.load_latest("s1").await.unwrap().unwrap();
        assert_eq!(latest.cycle_id, 200);
        let other = store.load_latest("s2").await.unwrap().unwrap();
        assert_eq!(other.cycle_id, 50);
    }

    #[tokio::test]
    async fn missing_session_loads_none() {
        let store = InMemoryCheckpointStore::new();
        assert!(store.load_latest("absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCheckpointStore::new(dir.path());

        let saved = make_checkpoint("session-a", 150);
        store.save(&saved).await.unwrap();

        let loaded = store.load_latest("session-a").await.unwrap().unwrap();
        assert_eq!(loaded.cycle_id, 150);
        assert_eq!(
            loaded.cumulative_balances.get("BTC"),
            Some(&dec!(10250.75))
        );
        assert_eq!(loaded.cumulative_trade_counts.get("ETH"), Some(&37));
    }

    #[tokio::test]
    async fn file_store_replaces_older_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCheckpointStore::new(dir.path());

        store.save(&make_checkpoint("session-a", 100)).await.unwrap();
        store.save(&make_checkpoint("session-a", 250)).await.unwrap();

        let loaded = store.load_latest("session-a").await.unwrap().unwrap();
        assert_eq!(loaded.cycle_id, 250);
    }

    #[tokio::test]
    async fn file_store_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCheckpointStore::new(dir.path());
        assert!(store.load_latest("nope").await.unwrap().is_none());
    }
}
