//! Immutable snapshots of a run's channel state.
//!
//! A [`Checkpoint`] is everything needed to resume a run: the serialized
//! state of every channel, the monotone version of every channel, and
//! the per-process record of which channel versions each process last
//! reacted to. Checkpoints are produced at every step boundary and are
//! the only unit the persistence layer deals in.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::channels::Channels;

/// Monotone per-channel version. The checkpointer picks the generator;
/// the default is a plain increment.
pub type ChannelVersion = u64;

/// Map of channel name to the version a process (or the interrupt gate)
/// last reacted to.
pub type VersionsSeen = FxHashMap<String, FxHashMap<String, ChannelVersion>>;

/// Snapshot of all channel states at a step boundary.
///
/// Invariant: for every process `P` and trigger channel `C` of `P`, if
/// `channel_versions[C] > versions_seen[P][C]` then `P` is eligible to
/// run in the next step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unique id; task ids for the following step derive from it.
    pub id: String,
    /// When this snapshot was taken.
    pub ts: DateTime<Utc>,
    /// Serialized channel state, keyed by channel name. Channels that
    /// have never been written (and context channels) are absent.
    pub channel_values: FxHashMap<String, Value>,
    /// Monotone version per channel, advanced on every written step.
    pub channel_versions: FxHashMap<String, ChannelVersion>,
    /// Per-process seen versions, used for trigger gating.
    pub versions_seen: VersionsSeen,
}

/// Where a checkpoint came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointSource {
    /// Written after absorbing caller input.
    Input,
    /// Written at a superstep boundary by the loop.
    Loop,
    /// Written by an out-of-band state update (e.g. interrupt resume).
    Update,
}

/// Metadata stored alongside each checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub source: CheckpointSource,
    /// Step counter; `-1` marks the input checkpoint of a fresh run.
    pub step: i64,
    /// Snapshot of the writes that produced this checkpoint.
    pub writes: Value,
}

impl CheckpointMetadata {
    pub fn new(source: CheckpointSource, step: i64, writes: Value) -> Self {
        Self {
            source,
            step,
            writes,
        }
    }
}

/// A write produced by a completed task that has not yet been folded
/// into channels by `apply_writes`. Keyed by `task_id` so replays
/// collapse into a set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingWrite {
    pub task_id: String,
    pub channel: String,
    pub value: Value,
}

/// A checkpoint with no channel state, the starting point of every run.
pub fn empty_checkpoint() -> Checkpoint {
    Checkpoint {
        id: Uuid::new_v4().to_string(),
        ts: Utc::now(),
        channel_values: FxHashMap::default(),
        channel_versions: FxHashMap::default(),
        versions_seen: FxHashMap::default(),
    }
}

/// Snapshot the live channels into a new checkpoint, carrying versions
/// and seen-maps forward from `previous`.
pub fn create_checkpoint(previous: &Checkpoint, channels: &Channels) -> Checkpoint {
    Checkpoint {
        id: Uuid::new_v4().to_string(),
        ts: Utc::now(),
        channel_values: channels.checkpoint_values(),
        channel_versions: previous.channel_versions.clone(),
        versions_seen: previous.versions_seen.clone(),
    }
}
