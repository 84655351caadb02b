//! Concurrent dispatcher for the tasks of a single superstep.

use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::debug;

use crate::errors::EngineError;
use crate::graph::Graph;
use crate::process::{ProcessError, Task, TaskContext};

/// Run one step's tasks concurrently and wait for all to finish.
///
/// Tasks are independent: each reads the shared step-start snapshot and
/// appends to its own write buffer. The first failure aborts the rest
/// and surfaces the original error; an elapsed step timeout aborts the
/// rest and surfaces [`EngineError::StepTimeout`]. Writes buffered by
/// aborted or sibling tasks are left unrecorded by the caller.
pub(crate) async fn run_step_tasks(
    graph: &Graph,
    tasks: &[Task],
    snapshot: Arc<FxHashMap<String, Value>>,
    step: i64,
    timeout: Option<Duration>,
) -> Result<(), EngineError> {
    let mut inflight: JoinSet<(String, Result<(), ProcessError>)> = JoinSet::new();
    for task in tasks {
        let Some(process) = graph.process(&task.name) else {
            continue;
        };
        let body = process.body();
        let ctx = TaskContext::new(snapshot.clone(), task.writes.clone());
        let input = task.input.clone();
        let name = task.name.clone();
        debug!(process = %name, step, task_id = %task.id, "spawning task");
        inflight.spawn(async move {
            let result = body(input, ctx).await;
            (name, result)
        });
    }

    let deadline = timeout.map(|t| Instant::now() + t);
    while !inflight.is_empty() {
        let joined = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, inflight.join_next()).await {
                Ok(joined) => joined,
                Err(_) => {
                    inflight.abort_all();
                    return Err(EngineError::StepTimeout { step });
                }
            },
            None => inflight.join_next().await,
        };
        match joined {
            Some(Ok((_, Ok(())))) => {}
            Some(Ok((process, Err(source)))) => {
                inflight.abort_all();
                return Err(EngineError::Task { process, source });
            }
            Some(Err(join_error)) => {
                if join_error.is_cancelled() {
                    continue;
                }
                inflight.abort_all();
                return Err(EngineError::Join(join_error));
            }
            None => break,
        }
    }
    Ok(())
}
