//! The local driver: runs a graph to a terminal status on one machine.

use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::checkpointers::Checkpointer;
use crate::errors::EngineError;
use crate::graph::Graph;
use crate::io::{StreamEmitter, StreamEvent};
use crate::process::Task;
use crate::runtime::config::RunConfig;
use crate::runtime::executor::run_step_tasks;
use crate::runtime::step_loop::{LoopStatus, StepLoop};

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Done,
    InterruptBefore,
    InterruptAfter,
    OutOfSteps,
    /// Distributed runs surface task failures as a status; local runs
    /// return the error itself instead.
    Error,
}

/// What a run ended with: its status, the step of the last checkpoint,
/// and the current output channel values.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub step: i64,
    pub output: Option<Value>,
}

/// A streaming run: events arrive while the drive loop makes progress.
pub struct RunStream {
    /// `values` / `updates` / `debug` events in step order.
    pub events: flume::Receiver<StreamEvent>,
    handle: JoinHandle<Result<RunOutcome, EngineError>>,
}

impl RunStream {
    /// Wait for the run to reach a terminal status.
    pub async fn join(self) -> Result<RunOutcome, EngineError> {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(join_error) => Err(EngineError::Join(join_error)),
        }
    }
}

/// Executes a [`Graph`] with the step-loop semantics: one driver, many
/// concurrent tasks per step, checkpoints at every boundary.
///
/// ```no_run
/// use std::sync::Arc;
/// use lockstep::channels::ChannelSpec;
/// use lockstep::checkpointers::InMemoryCheckpointer;
/// use lockstep::graph::Graph;
/// use lockstep::process::Process;
/// use lockstep::runtime::{Engine, RunConfig};
/// use serde_json::json;
///
/// # async fn example() -> Result<(), lockstep::errors::EngineError> {
/// let graph = Graph::builder()
///     .add_channel("input", ChannelSpec::LastValue)
///     .add_channel("output", ChannelSpec::LastValue)
///     .add_process(
///         "one",
///         Process::subscribe_to("input").run(|value, ctx| async move {
///             ctx.write("output", json!(value.as_i64().unwrap_or(0) + 1));
///             Ok(())
///         }),
///     )
///     .with_input(["input"])
///     .with_output(["output"])
///     .build()
///     .expect("valid graph");
///
/// let engine = Engine::new(graph).with_checkpointer(Arc::new(InMemoryCheckpointer::new()));
/// let outcome = engine.invoke(Some(json!(2)), RunConfig::new("thread-1")).await?;
/// assert_eq!(outcome.output, Some(json!(3)));
/// # Ok(())
/// # }
/// ```
pub struct Engine {
    graph: Arc<Graph>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
}

impl Engine {
    pub fn new(graph: Graph) -> Self {
        Self {
            graph: Arc::new(graph),
            checkpointer: None,
        }
    }

    pub fn from_arc(graph: Arc<Graph>) -> Self {
        Self {
            graph,
            checkpointer: None,
        }
    }

    #[must_use]
    pub fn with_checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    /// Drive the run to a terminal status and return it. `input: None`
    /// resumes a previously interrupted thread.
    #[instrument(skip(self, input), fields(thread_id = %config.thread_id), err)]
    pub async fn invoke(
        &self,
        input: Option<Value>,
        config: RunConfig,
    ) -> Result<RunOutcome, EngineError> {
        run_loop(
            self.graph.clone(),
            self.checkpointer.clone(),
            input,
            config,
            StreamEmitter::disabled(),
        )
        .await
    }

    /// Start the run in the background and stream intermediate events.
    pub fn stream(&self, input: Option<Value>, config: RunConfig) -> RunStream {
        let (tx, rx) = flume::unbounded();
        let emitter = StreamEmitter::new(tx, config.stream_modes.clone());
        let handle = tokio::spawn(run_loop(
            self.graph.clone(),
            self.checkpointer.clone(),
            input,
            config,
            emitter,
        ));
        RunStream { events: rx, handle }
    }
}

async fn run_loop(
    graph: Arc<Graph>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    input: Option<Value>,
    config: RunConfig,
    emitter: StreamEmitter,
) -> Result<RunOutcome, EngineError> {
    let step_timeout = config.step_timeout;
    let mut step_loop = StepLoop::enter(graph.clone(), config, checkpointer, input, emitter).await?;

    loop {
        if !step_loop.tick().await? {
            break;
        }
        // Tasks reconciled from pending writes already ran elsewhere.
        let to_run: Vec<Task> = step_loop
            .tasks()
            .iter()
            .filter(|t| !t.has_writes())
            .cloned()
            .collect();
        if to_run.is_empty() {
            continue;
        }
        let snapshot = Arc::new(step_loop.channels().snapshot_values());
        run_step_tasks(
            &graph,
            &to_run,
            snapshot,
            step_loop.current_step(),
            step_timeout,
        )
        .await?;
        for task in &to_run {
            let writes = task.writes.lock().clone();
            step_loop.put_writes(&task.id, writes).await?;
        }
    }

    let status = match step_loop.status() {
        LoopStatus::Done | LoopStatus::Pending => RunStatus::Done,
        LoopStatus::InterruptBefore => RunStatus::InterruptBefore,
        LoopStatus::InterruptAfter => RunStatus::InterruptAfter,
        LoopStatus::OutOfSteps => RunStatus::OutOfSteps,
    };
    Ok(RunOutcome {
        status,
        step: step_loop.checkpointed_step(),
        output: step_loop.output(),
    })
}
