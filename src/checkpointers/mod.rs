//! Pluggable persistence for checkpoints and pending writes.
//!
//! The step loop persists two kinds of records through a
//! [`Checkpointer`]: full [`Checkpoint`] snapshots at every step
//! boundary, and per-task pending writes as tasks complete. Resuming a
//! run loads both back as a [`CheckpointTuple`].
//!
//! Implementations must be safe under concurrent `put` / `put_writes`
//! for distinct task ids on the same thread, and must preserve the order
//! of writes within a single `put_writes` call. Durable backends live
//! outside this crate; [`InMemoryCheckpointer`] covers tests and
//! ephemeral runs.

pub mod memory;

pub use memory::InMemoryCheckpointer;

use async_trait::async_trait;
use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;

use crate::checkpoint::{ChannelVersion, Checkpoint, CheckpointMetadata, PendingWrite};
use crate::runtime::RunConfigSnapshot;

/// Errors from checkpointer operations.
#[derive(Debug, Error, Diagnostic)]
pub enum CheckpointerError {
    /// Backend storage error (database, filesystem, network).
    #[error("backend error: {message}")]
    #[diagnostic(
        code(lockstep::checkpointer::backend),
        help("Check backend connectivity and permissions; backend message: {message}.")
    )]
    Backend { message: String },

    /// Serialization or other unexpected failure.
    #[error("checkpointer error: {message}")]
    #[diagnostic(code(lockstep::checkpointer::other))]
    Other { message: String },
}

pub type Result<T> = std::result::Result<T, CheckpointerError>;

/// Everything known about a thread's saved position.
#[derive(Debug, Clone)]
pub struct CheckpointTuple {
    /// The config the checkpoint is stored under, with `thread_ts` set
    /// to the checkpoint's id.
    pub config: RunConfigSnapshot,
    pub checkpoint: Checkpoint,
    pub metadata: CheckpointMetadata,
    /// Config of the parent checkpoint, when one exists.
    pub parent_config: Option<RunConfigSnapshot>,
    /// Writes recorded against this checkpoint that have not yet been
    /// folded into channels.
    pub pending_writes: Vec<PendingWrite>,
}

/// Persistent storage for checkpoints and pending writes.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Load the checkpoint `config` points at: the one named by
    /// `thread_ts` when set, otherwise the thread's latest. `None` when
    /// the thread has no checkpoints.
    async fn get_tuple(&self, config: &RunConfigSnapshot) -> Result<Option<CheckpointTuple>>;

    /// Store a checkpoint and return the config that names it
    /// (`thread_ts` = the checkpoint id). The previous `thread_ts`
    /// becomes the parent link.
    async fn put(
        &self,
        config: &RunConfigSnapshot,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<RunConfigSnapshot>;

    /// Record one task's writes against the checkpoint `config` points
    /// at. Replaying the same `task_id` replaces the earlier record, so
    /// pending writes form a set keyed by task id.
    async fn put_writes(
        &self,
        config: &RunConfigSnapshot,
        writes: Vec<(String, Value)>,
        task_id: String,
    ) -> Result<()>;

    /// Next version for a channel. Must be strictly monotone per
    /// channel; the default is a plain increment.
    fn get_next_version(&self, previous: Option<ChannelVersion>) -> ChannelVersion {
        previous.map_or(1, |v| v + 1)
    }
}
