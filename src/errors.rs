//! Engine-level error surface.

use miette::Diagnostic;
use thiserror::Error;

use crate::channels::ChannelError;
use crate::checkpointers::CheckpointerError;
use crate::process::ProcessError;
use crate::relay::BusError;

/// Errors surfaced by the step loop, the local executor, and the
/// distributed workers.
#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    /// A user process wrote to a channel maintained by the engine.
    #[error("write to reserved channel `{channel}`")]
    #[diagnostic(
        code(lockstep::reserved_channel_write),
        help("`{channel}` is maintained by the engine; write to an application channel instead.")
    )]
    ReservedChannelWrite { channel: String },

    #[error("invalid run configuration: {message}")]
    #[diagnostic(code(lockstep::invalid_config))]
    InvalidConfig { message: String },

    /// Caller input could not be mapped to channel writes.
    #[error("unusable input: {message}")]
    #[diagnostic(
        code(lockstep::input),
        help("Provide a value for a declared input channel.")
    )]
    Input { message: String },

    /// A step exceeded its configured timeout; its tasks were cancelled.
    #[error("step {step} timed out")]
    #[diagnostic(
        code(lockstep::step_timeout),
        help("Raise `step_timeout` or reduce the work each process does per step.")
    )]
    StepTimeout { step: i64 },

    /// A process body failed; sibling tasks of the step were cancelled.
    #[error("process `{process}` failed: {source}")]
    #[diagnostic(code(lockstep::task))]
    Task {
        process: String,
        #[source]
        source: ProcessError,
    },

    #[error("task join error: {0}")]
    #[diagnostic(code(lockstep::join))]
    Join(#[from] tokio::task::JoinError),

    /// The executor worker received a task the current checkpoint does
    /// not know about.
    #[error("task not found: {id}")]
    #[diagnostic(
        code(lockstep::task_not_found),
        help("The checkpoint advanced past this task; the message is stale.")
    )]
    TaskNotFound { id: String },

    /// The executor worker received a task for a thread with no saved
    /// checkpoint.
    #[error("no checkpoint for thread `{thread_id}`")]
    #[diagnostic(code(lockstep::checkpoint_not_found))]
    CheckpointNotFound { thread_id: String },

    #[error(transparent)]
    #[diagnostic(code(lockstep::checkpointer))]
    Checkpointer(#[from] CheckpointerError),

    #[error(transparent)]
    #[diagnostic(code(lockstep::bus))]
    Bus(#[from] BusError),

    #[error(transparent)]
    #[diagnostic(code(lockstep::channel))]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    #[diagnostic(code(lockstep::graph))]
    Graph(#[from] crate::graph::GraphError),

    /// A bus message failed to encode or decode.
    #[error("message codec error: {message}")]
    #[diagnostic(code(lockstep::codec))]
    Codec { message: String },
}
