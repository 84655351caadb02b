use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::checkpoint::{Checkpoint, CheckpointMetadata, PendingWrite};
use crate::runtime::RunConfigSnapshot;

use super::{Checkpointer, CheckpointerError, CheckpointTuple, Result};

#[derive(Debug, Clone)]
struct StoredCheckpoint {
    checkpoint: Checkpoint,
    metadata: CheckpointMetadata,
    parent_ts: Option<String>,
}

/// Process-local checkpointer keeping full per-thread history.
///
/// Fast and non-durable; intended for tests and ephemeral runs. Pending
/// writes are stored per `(thread, checkpoint, task)` so a replayed
/// `put_writes` for the same task id replaces the earlier record.
#[derive(Default)]
pub struct InMemoryCheckpointer {
    threads: RwLock<FxHashMap<String, Vec<StoredCheckpoint>>>,
    writes: RwLock<FxHashMap<(String, String), Vec<PendingWrite>>>,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }

    fn pending_for(&self, thread_id: &str, checkpoint_id: &str) -> Vec<PendingWrite> {
        self.writes
            .read()
            .get(&(thread_id.to_string(), checkpoint_id.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn get_tuple(&self, config: &RunConfigSnapshot) -> Result<Option<CheckpointTuple>> {
        let threads = self.threads.read();
        let Some(history) = threads.get(&config.thread_id) else {
            return Ok(None);
        };
        let stored = match &config.thread_ts {
            Some(ts) => history.iter().find(|s| s.checkpoint.id == *ts),
            None => history.last(),
        };
        let Some(stored) = stored else {
            return Ok(None);
        };
        let tuple_config = RunConfigSnapshot {
            thread_ts: Some(stored.checkpoint.id.clone()),
            ..config.clone()
        };
        let parent_config = stored.parent_ts.as_ref().map(|ts| RunConfigSnapshot {
            thread_ts: Some(ts.clone()),
            ..config.clone()
        });
        let pending_writes = self.pending_for(&config.thread_id, &stored.checkpoint.id);
        Ok(Some(CheckpointTuple {
            config: tuple_config,
            checkpoint: stored.checkpoint.clone(),
            metadata: stored.metadata.clone(),
            parent_config,
            pending_writes,
        }))
    }

    async fn put(
        &self,
        config: &RunConfigSnapshot,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<RunConfigSnapshot> {
        let next_config = RunConfigSnapshot {
            thread_ts: Some(checkpoint.id.clone()),
            ..config.clone()
        };
        let stored = StoredCheckpoint {
            checkpoint,
            metadata,
            parent_ts: config.thread_ts.clone(),
        };
        self.threads
            .write()
            .entry(config.thread_id.clone())
            .or_default()
            .push(stored);
        Ok(next_config)
    }

    async fn put_writes(
        &self,
        config: &RunConfigSnapshot,
        writes: Vec<(String, Value)>,
        task_id: String,
    ) -> Result<()> {
        let thread_ts = config
            .thread_ts
            .clone()
            .ok_or_else(|| CheckpointerError::Other {
                message: "put_writes requires a config pinned to a checkpoint".into(),
            })?;
        let key = (config.thread_id.clone(), thread_ts);
        let mut all = self.writes.write();
        let slot = all.entry(key).or_default();
        slot.retain(|w| w.task_id != task_id);
        slot.extend(writes.into_iter().map(|(channel, value)| PendingWrite {
            task_id: task_id.clone(),
            channel,
            value,
        }));
        Ok(())
    }
}
