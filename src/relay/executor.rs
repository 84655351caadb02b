//! The executor role-worker: runs one prepared task per message and
//! persists its writes.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use crate::algo::prepare_single_task;
use crate::channels::Channels;
use crate::checkpointers::Checkpointer;
use crate::constants::{ERROR, NO_WRITES, SCHEDULED};
use crate::errors::EngineError;
use crate::graph::Graph;
use crate::process::TaskContext;
use crate::relay::bus::{Bus, Topic};
use crate::relay::messages::{decode, encode, MessageToExecutor, MessageToOrchestrator};

/// Long-running worker consuming the `executor` topic.
///
/// For each message it re-derives the named task against the pinned
/// checkpoint, runs it, and persists every write under the task's id.
/// A stale task (already applied, or a path the checkpoint no longer
/// knows) is recorded as an `ERROR` write instead of failing the
/// worker. Either way the orchestrator is woken afterwards.
pub struct ExecutorWorker {
    graph: Arc<Graph>,
    checkpointer: Arc<dyn Checkpointer>,
    bus: Arc<dyn Bus>,
    group: String,
    batch_max_n: usize,
    batch_max_wait: Duration,
}

impl ExecutorWorker {
    pub fn new(
        graph: Arc<Graph>,
        checkpointer: Arc<dyn Checkpointer>,
        bus: Arc<dyn Bus>,
    ) -> Self {
        Self {
            graph,
            checkpointer,
            bus,
            group: "executor".to_string(),
            batch_max_n: 10,
            batch_max_wait: Duration::from_millis(1000),
        }
    }

    #[must_use]
    pub fn with_batch(mut self, max_n: usize, max_wait: Duration) -> Self {
        self.batch_max_n = max_n;
        self.batch_max_wait = max_wait;
        self
    }

    /// Consume one batch, run each task, commit offsets. Returns the
    /// number of messages consumed.
    #[instrument(skip(self), err)]
    pub async fn run_batch(&self) -> Result<usize, EngineError> {
        let records = self
            .bus
            .consume(
                Topic::Executor,
                &self.group,
                self.batch_max_n,
                self.batch_max_wait,
            )
            .await?;
        let mut last_offset = None;
        for record in &records {
            let message: MessageToExecutor = decode(&record.payload)?;
            self.handle(message).await?;
            last_offset = Some(record.offset);
        }
        if let Some(offset) = last_offset {
            self.bus.commit(Topic::Executor, &self.group, offset).await?;
        }
        Ok(records.len())
    }

    async fn handle(&self, message: MessageToExecutor) -> Result<(), EngineError> {
        let saved = self
            .checkpointer
            .get_tuple(&message.config)
            .await?
            .ok_or_else(|| EngineError::CheckpointNotFound {
                thread_id: message.config.thread_id.clone(),
            })?;
        let mut checkpoint = saved.checkpoint;
        let mut channels = Channels::materialize(self.graph.specs(), &checkpoint)?;

        match prepare_single_task(
            &message.task.path,
            &message.task.id,
            &mut checkpoint,
            &self.graph,
            &channels,
            message.task.step,
        ) {
            None => {
                warn!(
                    thread_id = %message.config.thread_id,
                    task_id = %message.task.id,
                    "task not found for checkpoint; recording error"
                );
                self.checkpointer
                    .put_writes(
                        &message.config,
                        vec![(ERROR.to_string(), json!("TaskNotFound"))],
                        message.task.id.clone(),
                    )
                    .await?;
            }
            Some(task) => {
                let already_done = message.task.resuming
                    && saved
                        .pending_writes
                        .iter()
                        .any(|w| w.task_id == task.id && w.channel != SCHEDULED);
                if already_done {
                    debug!(task_id = %task.id, "task writes already recorded; skipping");
                } else if let Some(process) = self.graph.process(&task.name) {
                    let snapshot = Arc::new(channels.snapshot_values());
                    let ctx = TaskContext::new(snapshot, task.writes.clone());
                    let body = process.body();
                    match body(task.input.clone(), ctx).await {
                        Ok(()) => {
                            let writes = task.writes.lock().clone();
                            let writes = if writes.is_empty() {
                                vec![(NO_WRITES.to_string(), Value::Null)]
                            } else {
                                writes
                            };
                            self.checkpointer
                                .put_writes(&message.config, writes, task.id.clone())
                                .await?;
                        }
                        Err(error) => {
                            warn!(process = %task.name, %error, "task failed; recording error");
                            self.checkpointer
                                .put_writes(
                                    &message.config,
                                    vec![(
                                        ERROR.to_string(),
                                        json!({
                                            "process": task.name,
                                            "message": error.to_string(),
                                        }),
                                    )],
                                    task.id.clone(),
                                )
                                .await?;
                        }
                    }
                }
            }
        }
        channels.release();

        // Wake the orchestrator whatever happened above.
        let wake = MessageToOrchestrator {
            input: None,
            config: message.config.clone(),
            finally_: None,
        };
        self.bus
            .produce(Topic::Orchestrator, encode(&wake)?)
            .await?;
        Ok(())
    }
}
