//! The orchestrator role-worker: owns checkpoint transitions.
//!
//! Each consumed message drives the step loop for one thread. When the
//! loop prepares tasks, the orchestrator hands them to the executor
//! topic and marks them scheduled; when the loop reaches a terminal
//! status, it optionally dispatches the message's `finally` task. The
//! checkpoint only ever advances here, gated on every scheduled task
//! having reported writes, so executor replays cannot double-apply.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::checkpointers::Checkpointer;
use crate::constants::{ERROR, SCHEDULED};
use crate::errors::EngineError;
use crate::graph::Graph;
use crate::io::StreamEmitter;
use crate::process::Task;
use crate::relay::bus::{Bus, Topic};
use crate::relay::messages::{decode, encode, MessageToExecutor, MessageToOrchestrator, TaskDescriptor};
use crate::runtime::step_loop::{LoopStatus, StepLoop};
use crate::runtime::RunStatus;

/// Outcome of one consume/process/commit cycle.
#[derive(Debug, Default)]
pub struct OrchestratorBatch {
    /// Messages consumed and committed.
    pub consumed: usize,
    /// Threads that reached a terminal status in this batch.
    pub terminal: Vec<(String, RunStatus)>,
}

/// Long-running worker consuming the `orchestrator` topic.
pub struct Orchestrator {
    graph: Arc<Graph>,
    checkpointer: Arc<dyn Checkpointer>,
    bus: Arc<dyn Bus>,
    group: String,
    batch_max_n: usize,
    batch_max_wait: Duration,
}

impl Orchestrator {
    pub fn new(
        graph: Arc<Graph>,
        checkpointer: Arc<dyn Checkpointer>,
        bus: Arc<dyn Bus>,
    ) -> Self {
        Self {
            graph,
            checkpointer,
            bus,
            group: "orchestrator".to_string(),
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

    /// Consume one batch, run a loop tick per message, commit offsets.
    #[instrument(skip(self), err)]
    pub async fn run_batch(&self) -> Result<OrchestratorBatch, EngineError> {
        let records = self
            .bus
            .consume(
                Topic::Orchestrator,
                &self.group,
                self.batch_max_n,
                self.batch_max_wait,
            )
            .await?;
        let mut batch = OrchestratorBatch {
            consumed: records.len(),
            terminal: Vec::new(),
        };
        let mut last_offset = None;
        for record in &records {
            let message: MessageToOrchestrator = decode(&record.payload)?;
            if let Some(terminal) = self.handle(message).await? {
                batch.terminal.push(terminal);
            }
            last_offset = Some(record.offset);
        }
        if let Some(offset) = last_offset {
            self.bus.commit(Topic::Orchestrator, &self.group, offset).await?;
        }
        Ok(batch)
    }

    async fn handle(
        &self,
        message: MessageToOrchestrator,
    ) -> Result<Option<(String, RunStatus)>, EngineError> {
        let thread_id = message.config.thread_id.clone();
        // Always operate on the thread's latest checkpoint.
        let mut base = message.config.clone();
        base.thread_ts = None;
        let run_config = base.to_run_config();

        let mut step_loop = StepLoop::enter(
            self.graph.clone(),
            run_config,
            Some(self.checkpointer.clone()),
            message.input.clone(),
            StreamEmitter::disabled(),
        )
        .await?;

        // A task failure recorded by the executor terminates the run.
        if let Some(failure) = step_loop
            .pending_writes()
            .iter()
            .find(|w| w.channel == ERROR)
        {
            warn!(thread_id = %thread_id, error = %failure.value, "run failed in executor");
            self.dispatch_finally(&message).await?;
            return Ok(Some((thread_id, RunStatus::Error)));
        }

        loop {
            if !step_loop.tick().await? {
                break;
            }
            let to_dispatch: Vec<Task> = step_loop
                .tasks()
                .iter()
                .filter(|t| !t.has_writes())
                .cloned()
                .collect();
            if to_dispatch.is_empty() {
                // Everything in this step already ran; the next tick
                // folds the writes in and advances.
                continue;
            }
            let step = step_loop.current_step();
            for task in &to_dispatch {
                let out = MessageToExecutor {
                    config: step_loop.checkpoint_config().clone(),
                    task: TaskDescriptor {
                        path: task.path.clone(),
                        id: task.id.clone(),
                        step,
                        resuming: message.input.is_none(),
                    },
                    finally_: message.finally_.clone(),
                };
                debug!(thread_id = %thread_id, process = %task.name, step, "dispatching task");
                // Mark scheduled before producing: the executor's write
                // record must replace the marker, never the reverse.
                step_loop
                    .put_writes(&task.id, vec![(SCHEDULED.to_string(), Value::Null)])
                    .await?;
                self.bus.produce(Topic::Executor, encode(&out)?).await?;
            }
            break;
        }

        let status = match step_loop.status() {
            LoopStatus::Pending => None,
            LoopStatus::Done => Some(RunStatus::Done),
            LoopStatus::InterruptBefore => Some(RunStatus::InterruptBefore),
            LoopStatus::InterruptAfter => Some(RunStatus::InterruptAfter),
            LoopStatus::OutOfSteps => Some(RunStatus::OutOfSteps),
        };
        match status {
            Some(status) => {
                debug!(thread_id = %thread_id, ?status, "run reached terminal status");
                self.dispatch_finally(&message).await?;
                Ok(Some((thread_id, status)))
            }
            None => Ok(None),
        }
    }

    async fn dispatch_finally(&self, message: &MessageToOrchestrator) -> Result<(), EngineError> {
        if let Some(finally) = &message.finally_ {
            self.bus
                .produce(Topic::Executor, encode(finally.as_ref())?)
                .await?;
        }
        Ok(())
    }
}
