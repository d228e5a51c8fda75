//! Checkpoint persistence for resumable tagging runs.
//!
//! State is written through the storage layer's checkpoint bucket, so it
//! works unchanged against a local directory or S3. Each save keeps a
//! backup of the previous checkpoint; a save that fails midway still
//! leaves a loadable state behind.

mod state;

pub use state::{CheckpointState, RunPhase, CHECKPOINT_VERSION};

use crate::models::{Result, SkilltagError};
use crate::storage::{Bucket, BucketStore};
use bytes::Bytes;
use tracing::{debug, info};

const CHECKPOINT_FILE: &str = "checkpoint.json";
const BACKUP_FILE: &str = "checkpoint.backup.json";

/// Persists and loads checkpoint state.
pub struct CheckpointManager {
    store: BucketStore,
}

impl CheckpointManager {
    pub fn new(store: BucketStore) -> Self {
        Self { store }
    }

    pub async fn exists(&self) -> Result<bool> {
        let current = self.store.get_opt(Bucket::Checkpoint, CHECKPOINT_FILE).await?;
        Ok(current.is_some())
    }

    /// Save state, keeping the previous checkpoint as a backup. A storage
    /// fault while reading the previous checkpoint fails the save rather
    /// than silently skipping the backup.
    pub async fn save(&self, state: &CheckpointState) -> Result<()> {
        if let Some(previous) = self.store.get_opt(Bucket::Checkpoint, CHECKPOINT_FILE).await? {
            self.store
                .put(Bucket::Checkpoint, BACKUP_FILE, previous)
                .await?;
        }

        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| SkilltagError::Checkpoint(format!("serializing checkpoint: {e}")))?;
        self.store
            .put(Bucket::Checkpoint, CHECKPOINT_FILE, Bytes::from(bytes))
            .await?;
        debug!(phase = ?state.phase, tags = state.tags.len(), "Checkpoint saved");
        Ok(())
    }

    /// Load the checkpoint. A missing, unreadable, or version-mismatched
    /// checkpoint is fatal to a resume request.
    pub async fn load(&self) -> Result<CheckpointState> {
        let bytes = self
            .store
            .get(Bucket::Checkpoint, CHECKPOINT_FILE)
            .await
            .map_err(|e| {
                SkilltagError::Checkpoint(format!("no checkpoint to resume from: {e}"))
            })?;
        let state: CheckpointState = serde_json::from_slice(&bytes)
            .map_err(|e| SkilltagError::Checkpoint(format!("corrupt checkpoint: {e}")))?;

        if state.version != CHECKPOINT_VERSION {
            return Err(SkilltagError::Checkpoint(format!(
                "checkpoint version {} does not match expected {}",
                state.version, CHECKPOINT_VERSION
            )));
        }
        info!(
            run_id = %state.run_id,
            phase = ?state.phase,
            tags = state.tags.len(),
            "Loaded checkpoint"
        );
        Ok(state)
    }

    /// Remove the checkpoint after a run completes.
    pub async fn invalidate(&self) -> Result<()> {
        for file in [CHECKPOINT_FILE, BACKUP_FILE] {
            let names = self.store.list(Bucket::Checkpoint).await?;
            if names.iter().any(|n| n == file) {
                self.store.delete(Bucket::Checkpoint, file).await?;
            }
        }
        debug!("Checkpoint invalidated");
        Ok(())
    }
}
