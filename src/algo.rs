//! The pure scheduling core: fold writes into channels, decide which
//! processes run next, and gate interrupts.
//!
//! These functions transform a checkpoint given writes or compute the
//! runnable tasks of a step. They do no I/O; the step loop and the
//! distributed workers drive them.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

use crate::channels::Channels;
use crate::checkpoint::{ChannelVersion, Checkpoint};
use crate::constants::{is_reserved, INTERRUPT, IS_LAST_STEP};
use crate::errors::EngineError;
use crate::graph::Graph;
use crate::process::{Process, ProcessReads, Task};

/// Version generator hook; the checkpointer may supply its own.
pub type VersionGenerator<'a> = &'a (dyn Fn(Option<ChannelVersion>) -> ChannelVersion + Sync);

/// The default version generator: a plain monotone increment.
pub fn increment(previous: Option<ChannelVersion>) -> ChannelVersion {
    previous.map_or(1, |v| v + 1)
}

/// Deterministic task identity: the same `(checkpoint, step, process,
/// path)` yields the same id on any worker and across restarts.
pub fn derive_task_id(checkpoint_id: &str, step: i64, name: &str, path: &[String]) -> String {
    let namespace = Uuid::parse_str(checkpoint_id)
        .unwrap_or_else(|_| Uuid::new_v5(&Uuid::NAMESPACE_OID, checkpoint_id.as_bytes()));
    let key = format!("{step}:{name}:{}", path.join("/"));
    Uuid::new_v5(&namespace, key.as_bytes()).to_string()
}

/// Fold one step's writes into the live channels and advance versions.
///
/// Writes are grouped by channel in producer order. Channels that
/// received nothing are still notified with an empty update so variants
/// that reset per step observe the boundary. When `is_last_step` is
/// given, the reserved `is_last_step` channel is refreshed with it.
///
/// Returns the updated channel names in application order.
pub fn apply_writes(
    checkpoint: &mut Checkpoint,
    channels: &mut Channels,
    writes: &[(String, Value)],
    get_next_version: VersionGenerator<'_>,
    is_last_step: Option<bool>,
) -> Result<Vec<String>, EngineError> {
    let mut order: Vec<String> = Vec::new();
    let mut grouped: FxHashMap<String, Vec<Value>> = FxHashMap::default();
    for (channel, value) in writes {
        if is_reserved(channel) {
            return Err(EngineError::ReservedChannelWrite {
                channel: channel.clone(),
            });
        }
        if !grouped.contains_key(channel) {
            order.push(channel.clone());
        }
        grouped
            .entry(channel.clone())
            .or_default()
            .push(value.clone());
    }

    if let Some(flag) = is_last_step {
        if channels.contains(IS_LAST_STEP) {
            order.push(IS_LAST_STEP.to_string());
            grouped.insert(IS_LAST_STEP.to_string(), vec![Value::Bool(flag)]);
        }
    }

    let mut updated: Vec<String> = Vec::new();
    for name in &order {
        let values = grouped.remove(name).unwrap_or_default();
        match channels.get_mut(name) {
            Some(channel) => {
                channel.update(values)?;
                let previous = checkpoint.channel_versions.get(name).copied();
                checkpoint
                    .channel_versions
                    .insert(name.clone(), get_next_version(previous));
                updated.push(name.clone());
            }
            None => {
                warn!(channel = %name, "skipping write to channel with no readers");
            }
        }
    }

    // Step boundary for everything that was not written.
    let untouched: Vec<String> = channels
        .names()
        .filter(|n| !updated.iter().any(|u| u == n))
        .map(str::to_string)
        .collect();
    for name in untouched {
        if let Some(channel) = channels.get_mut(&name) {
            channel.update(Vec::new())?;
        }
    }

    Ok(updated)
}

/// Compute the tasks runnable in `step`.
///
/// A process is triggered when any of its trigger channels carries a
/// version greater than the process's seen version. Tasks come back in
/// registry insertion order. With `for_execution`, the seen versions of
/// the triggered channels are bumped so the process does not re-fire on
/// the same versions.
pub fn prepare_next_tasks(
    checkpoint: &mut Checkpoint,
    graph: &Graph,
    channels: &Channels,
    step: i64,
    for_execution: bool,
) -> Vec<Task> {
    let mut tasks = Vec::new();
    for (name, process) in graph.processes() {
        if let Some(task) =
            prepare_process_task(name, process, checkpoint, channels, step, for_execution)
        {
            tasks.push(task);
        }
    }
    tasks
}

/// Re-derive a single task by its path, as the distributed executor
/// does. `None` when the process is not currently triggered or the
/// derived id no longer matches (the task is stale).
pub fn prepare_single_task(
    path: &[String],
    task_id: &str,
    checkpoint: &mut Checkpoint,
    graph: &Graph,
    channels: &Channels,
    step: i64,
) -> Option<Task> {
    let [kind, name] = path else {
        return None;
    };
    if kind.as_str() != "pull" {
        return None;
    }
    let process = graph.process(name)?;
    let task = prepare_process_task(name, process, checkpoint, channels, step, true)?;
    if task.id == task_id {
        Some(task)
    } else {
        None
    }
}

fn prepare_process_task(
    name: &str,
    process: &Process,
    checkpoint: &mut Checkpoint,
    channels: &Channels,
    step: i64,
    for_execution: bool,
) -> Option<Task> {
    let triggered = process.triggers().iter().any(|channel| {
        version_of(checkpoint, channel) > seen_version(checkpoint, name, channel)
    });
    if !triggered {
        return None;
    }

    let input = match process.reads() {
        ProcessReads::Single { channel } => channels.read(channel).ok()?,
        ProcessReads::Mapped { entries } => {
            let mut fields = Map::new();
            for (key, channel) in entries {
                match channels.read(channel) {
                    Ok(value) => {
                        fields.insert(key.clone(), value);
                    }
                    // An empty trigger channel means the process is not
                    // runnable yet; an empty auxiliary read is skipped.
                    Err(_) if process.triggers().iter().any(|t| t == channel) => return None,
                    Err(_) => {}
                }
            }
            Value::Object(fields)
        }
        ProcessReads::Batch { channel, key } => {
            let value = channels.read(channel).ok()?;
            match (value, key) {
                (Value::Array(items), Some(key)) => Value::Array(
                    items
                        .into_iter()
                        .map(|item| {
                            let mut wrapped = Map::new();
                            wrapped.insert(key.clone(), item);
                            Value::Object(wrapped)
                        })
                        .collect(),
                ),
                (value, _) => value,
            }
        }
    };

    let path = vec!["pull".to_string(), name.to_string()];
    let id = derive_task_id(&checkpoint.id, step, name, &path);

    if for_execution {
        let bumps: Vec<(String, ChannelVersion)> = process
            .triggers()
            .iter()
            .map(|c| (c.clone(), version_of(checkpoint, c)))
            .collect();
        let seen = checkpoint.versions_seen.entry(name.to_string()).or_default();
        for (channel, version) in bumps {
            seen.insert(channel, version);
        }
    }

    Some(Task {
        name: name.to_string(),
        input,
        path,
        id,
        writes: Arc::new(Mutex::new(Vec::new())),
    })
}

/// Whether an interrupt policy fires for the prepared tasks.
///
/// True when some channel advanced since the last interrupt was cleared
/// and any task's process is named by the policy. The first condition
/// keeps a resumed run from re-interrupting on the same versions.
pub fn should_interrupt(
    checkpoint: &Checkpoint,
    interrupt_processes: &[String],
    tasks: &[Task],
) -> bool {
    if interrupt_processes.is_empty() || tasks.is_empty() {
        return false;
    }
    let cleared = checkpoint.versions_seen.get(INTERRUPT);
    let advanced = checkpoint.channel_versions.iter().any(|(channel, version)| {
        *version
            > cleared
                .and_then(|seen| seen.get(channel))
                .copied()
                .unwrap_or(0)
    });
    if !advanced {
        return false;
    }
    let named: FxHashSet<&str> = interrupt_processes.iter().map(String::as_str).collect();
    tasks.iter().any(|task| named.contains(task.name.as_str()))
}

fn version_of(checkpoint: &Checkpoint, channel: &str) -> ChannelVersion {
    checkpoint
        .channel_versions
        .get(channel)
        .copied()
        .unwrap_or(0)
}

fn seen_version(checkpoint: &Checkpoint, process: &str, channel: &str) -> ChannelVersion {
    checkpoint
        .versions_seen
        .get(process)
        .and_then(|seen| seen.get(channel))
        .copied()
        .unwrap_or(0)
}
