//! The superstep state machine.
//!
//! One [`StepLoop`] owns a run between two pause points. Each call to
//! [`StepLoop::tick`] performs either input absorption or one superstep
//! boundary: fold the previous step's writes into channels, persist a
//! checkpoint, and prepare the next step's tasks. The caller (the local
//! engine driver or the distributed orchestrator) executes the prepared
//! tasks between ticks and records their writes with
//! [`StepLoop::put_writes`].
//!
//! Channel updates from step N are visible only in step N+1; channels
//! are immutable for the duration of a step, and this loop's apply phase
//! is the only place they are mutated.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{json, Value};

use crate::algo::{apply_writes, increment, prepare_next_tasks, should_interrupt};
use crate::channels::Channels;
use crate::checkpoint::{
    create_checkpoint, empty_checkpoint, ChannelVersion, Checkpoint, CheckpointMetadata,
    CheckpointSource, PendingWrite,
};
use crate::checkpointers::Checkpointer;
use crate::constants::{INTERRUPT, NO_WRITES, SCHEDULED};
use crate::errors::EngineError;
use crate::graph::Graph;
use crate::io::{self, StreamEmitter, StreamMode};
use crate::process::Task;
use crate::runtime::config::{RunConfig, RunConfigSnapshot};

/// Where the loop's state machine currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    /// More work may remain; call `tick` again.
    Pending,
    /// No process is triggered; the run is complete.
    Done,
    /// An `interrupt_before` policy fired; resume with empty input.
    InterruptBefore,
    /// An `interrupt_after` policy fired; resume with empty input.
    InterruptAfter,
    /// The recursion limit was reached before the run completed.
    OutOfSteps,
}

enum InputState {
    Pending(Option<Value>),
    Done,
}

/// Drives supersteps for one run between two pause points.
pub struct StepLoop {
    graph: Arc<Graph>,
    config: RunConfig,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    checkpoint: Checkpoint,
    checkpoint_config: RunConfigSnapshot,
    metadata: CheckpointMetadata,
    pending_writes: Vec<PendingWrite>,
    channels: Channels,
    input: InputState,
    status: LoopStatus,
    tasks: Vec<Task>,
    step: i64,
    emitter: StreamEmitter,
}

impl StepLoop {
    /// Load the thread's saved position (or start empty), materialize
    /// channels, and stand ready to tick.
    pub(crate) async fn enter(
        graph: Arc<Graph>,
        config: RunConfig,
        checkpointer: Option<Arc<dyn Checkpointer>>,
        input: Option<Value>,
        emitter: StreamEmitter,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let base = config.snapshot();
        let saved = match &checkpointer {
            Some(cp) => cp.get_tuple(&base).await?,
            None => None,
        };
        let (checkpoint, checkpoint_config, metadata, pending_writes) = match saved {
            Some(tuple) => (
                tuple.checkpoint,
                tuple.config,
                tuple.metadata,
                tuple.pending_writes,
            ),
            None => (
                empty_checkpoint(),
                base,
                CheckpointMetadata::new(CheckpointSource::Input, -2, Value::Null),
                Vec::new(),
            ),
        };
        let channels = Channels::materialize(graph.specs(), &checkpoint)?;
        let step = metadata.step + 1;
        Ok(Self {
            graph,
            config,
            checkpointer,
            checkpoint,
            checkpoint_config,
            metadata,
            pending_writes,
            channels,
            input: InputState::Pending(input),
            status: LoopStatus::Pending,
            tasks: Vec::new(),
            step,
            emitter,
        })
    }

    /// Advance the state machine by one phase.
    ///
    /// Returns `true` when tasks are prepared and waiting to be
    /// executed; `false` when the loop is paused on a terminal status or
    /// still waiting for task writes.
    pub async fn tick(&mut self) -> Result<bool, EngineError> {
        if self.status != LoopStatus::Pending {
            return Ok(false);
        }

        if matches!(self.input, InputState::Pending(_)) {
            self.first().await?;
        } else {
            let done: FxHashSet<&str> = self
                .pending_writes
                .iter()
                .filter(|w| w.channel != SCHEDULED)
                .map(|w| w.task_id.as_str())
                .collect();
            if !self.tasks.iter().all(|t| done.contains(t.id.as_str())) {
                // Some scheduled task has not reported back yet.
                return Ok(false);
            }

            // Group writes by task, then apply in task order so the
            // outcome is independent of completion order.
            let mut grouped: FxHashMap<&str, Vec<(String, Value)>> = FxHashMap::default();
            for w in &self.pending_writes {
                if w.channel == SCHEDULED || w.channel == NO_WRITES {
                    continue;
                }
                grouped
                    .entry(w.task_id.as_str())
                    .or_default()
                    .push((w.channel.clone(), w.value.clone()));
            }
            let writes: Vec<(String, Value)> = self
                .tasks
                .iter()
                .flat_map(|t| grouped.remove(t.id.as_str()).unwrap_or_default())
                .collect();

            self.apply(&writes)?;

            let step_output =
                io::map_output_values(self.graph.output_channels(), &writes, &self.channels);
            if let Some(values) = &step_output {
                self.emitter.emit(StreamMode::Values, values.clone());
            }
            if self.emitter.wants(StreamMode::Updates) {
                if let Some(updates) =
                    io::map_output_updates(self.graph.output_channels(), &self.tasks)
                {
                    self.emitter.emit(StreamMode::Updates, updates);
                }
            }

            self.pending_writes.clear();
            self.put_checkpoint(CheckpointMetadata::new(
                CheckpointSource::Loop,
                self.step,
                step_output.unwrap_or(Value::Null),
            ))
            .await?;

            if should_interrupt(&self.checkpoint, &self.config.interrupt_after, &self.tasks) {
                self.status = LoopStatus::InterruptAfter;
                return Ok(false);
            }
        }

        if self.step >= self.config.recursion_limit as i64 {
            self.status = LoopStatus::OutOfSteps;
            return Ok(false);
        }

        self.tasks = prepare_next_tasks(
            &mut self.checkpoint,
            &self.graph,
            &self.channels,
            self.step,
            true,
        );
        if self.tasks.is_empty() {
            self.status = LoopStatus::Done;
            return Ok(false);
        }

        // Resume case: writes recorded by a worker that never got to
        // notify completion are attached to their task, so it is not
        // run again.
        for w in &self.pending_writes {
            if let Some(task) = self.tasks.iter().find(|t| t.id == w.task_id) {
                task.writes.lock().push((w.channel.clone(), w.value.clone()));
            }
        }

        if should_interrupt(&self.checkpoint, &self.config.interrupt_before, &self.tasks) {
            self.status = LoopStatus::InterruptBefore;
            return Ok(false);
        }

        Ok(true)
    }

    /// Absorb caller input, or treat its absence as "resume past the
    /// previous interrupt".
    async fn first(&mut self) -> Result<(), EngineError> {
        let input = match std::mem::replace(&mut self.input, InputState::Done) {
            InputState::Pending(value) => value,
            InputState::Done => None,
        };
        if let Some(value) = input {
            let writes = io::map_input(self.graph.input_channels(), value.clone())?;
            // Discard unfinished tasks from a previous checkpoint: their
            // triggers are marked seen so they do not re-fire alongside
            // the fresh input.
            let _ = prepare_next_tasks(
                &mut self.checkpoint,
                &self.graph,
                &self.channels,
                self.step,
                true,
            );
            self.apply(&writes)?;
            self.put_checkpoint(CheckpointMetadata::new(
                CheckpointSource::Input,
                self.step,
                value,
            ))
            .await?;
        } else {
            // Mark every current version as seen by the interrupt gate
            // so the pause point does not immediately re-trigger.
            let Checkpoint {
                channel_versions,
                versions_seen,
                ..
            } = &mut self.checkpoint;
            let cleared = versions_seen.entry(INTERRUPT.to_string()).or_default();
            for (name, version) in channel_versions.iter() {
                cleared.insert(name.clone(), *version);
            }
        }
        Ok(())
    }

    fn apply(&mut self, writes: &[(String, Value)]) -> Result<(), EngineError> {
        let limit = self.config.recursion_limit as i64;
        let next_step = self.step + 1;
        let checkpointer = self.checkpointer.clone();
        let next_version = move |prev: Option<ChannelVersion>| match &checkpointer {
            Some(cp) => cp.get_next_version(prev),
            None => increment(prev),
        };
        apply_writes(
            &mut self.checkpoint,
            &mut self.channels,
            writes,
            &next_version,
            Some(next_step == limit - 1),
        )?;
        Ok(())
    }

    /// Record one task's writes: durably via the checkpointer, and in
    /// the in-memory pending list the apply phase folds from. A task
    /// that produced nothing is recorded with a completion sentinel so
    /// the step can still close.
    pub async fn put_writes(
        &mut self,
        task_id: &str,
        writes: Vec<(String, Value)>,
    ) -> Result<(), EngineError> {
        let writes = if writes.is_empty() {
            vec![(NO_WRITES.to_string(), Value::Null)]
        } else {
            writes
        };
        self.pending_writes
            .extend(writes.iter().map(|(channel, value)| PendingWrite {
                task_id: task_id.to_string(),
                channel: channel.clone(),
                value: value.clone(),
            }));
        if let Some(cp) = &self.checkpointer {
            cp.put_writes(&self.checkpoint_config, writes, task_id.to_string())
                .await?;
        }
        Ok(())
    }

    async fn put_checkpoint(&mut self, metadata: CheckpointMetadata) -> Result<(), EngineError> {
        if let Some(cp) = &self.checkpointer {
            self.checkpoint = create_checkpoint(&self.checkpoint, &self.channels);
            self.checkpoint_config = cp
                .put(
                    &self.checkpoint_config,
                    self.checkpoint.clone(),
                    metadata.clone(),
                )
                .await?;
        }
        if self.emitter.wants(StreamMode::Debug) {
            self.emitter.emit(
                StreamMode::Debug,
                json!({
                    "step": metadata.step,
                    "source": serde_json::to_value(metadata.source).unwrap_or(Value::Null),
                    "checkpoint_id": self.checkpoint.id.clone(),
                    "ts": self.checkpoint.ts.to_rfc3339(),
                    "writes": metadata.writes.clone(),
                }),
            );
        }
        self.metadata = metadata;
        self.step += 1;
        Ok(())
    }

    pub fn status(&self) -> LoopStatus {
        self.status
    }

    /// The tasks prepared by the last successful tick.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// The step the prepared tasks belong to.
    pub fn current_step(&self) -> i64 {
        self.step
    }

    /// Step of the most recent checkpoint.
    pub fn checkpointed_step(&self) -> i64 {
        self.metadata.step
    }

    pub fn pending_writes(&self) -> &[PendingWrite] {
        &self.pending_writes
    }

    /// Config naming the latest stored checkpoint (`thread_ts` set once
    /// one exists).
    pub fn checkpoint_config(&self) -> &RunConfigSnapshot {
        &self.checkpoint_config
    }

    pub(crate) fn channels(&self) -> &Channels {
        &self.channels
    }

    /// Current values of the declared output channels.
    pub fn output(&self) -> Option<Value> {
        io::read_output(self.graph.output_channels(), &self.channels)
    }
}
