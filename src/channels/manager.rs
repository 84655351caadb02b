//! Scoped materialization of live channels from a checkpoint.

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::checkpoint::Checkpoint;

use super::{Channel, ChannelError, ChannelSpec};

/// The live channels of one run, owned by the step loop.
///
/// Materialization instantiates every declared channel in declaration
/// order and restores its checkpointed state; context channels acquire
/// their resource here. Teardown releases context resources in reverse
/// declaration order and runs on every exit path: [`Channels::release`]
/// is explicit, and `Drop` is the safety net for aborted runs.
pub struct Channels {
    entries: Vec<(String, Channel)>,
    index: FxHashMap<String, usize>,
    released: bool,
}

impl Channels {
    pub fn materialize(
        specs: &[(String, ChannelSpec)],
        checkpoint: &Checkpoint,
    ) -> Result<Self, ChannelError> {
        let mut entries = Vec::with_capacity(specs.len());
        let mut index = FxHashMap::default();
        for (name, spec) in specs {
            let mut channel = spec.build(name);
            if let Some(saved) = checkpoint.channel_values.get(name) {
                channel.restore(saved.clone())?;
            }
            index.insert(name.clone(), entries.len());
            entries.push((name.clone(), channel));
        }
        Ok(Self {
            entries,
            index,
            released: false,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Channel> {
        self.index.get(name).map(|&i| &self.entries[i].1)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Channel> {
        self.index.get(name).copied().map(|i| &mut self.entries[i].1)
    }

    /// Channel names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Read one channel's current value.
    pub fn read(&self, name: &str) -> Result<Value, ChannelError> {
        match self.get(name) {
            Some(channel) => channel.get(),
            None => Err(ChannelError::empty(name)),
        }
    }

    /// The immutable per-step read view: every channel that currently
    /// holds a value, keyed by name. Tasks read against this snapshot
    /// while the step is in flight.
    pub fn snapshot_values(&self) -> FxHashMap<String, Value> {
        self.entries
            .iter()
            .filter_map(|(name, channel)| channel.get().ok().map(|v| (name.clone(), v)))
            .collect()
    }

    /// Serializable channel states for a new checkpoint.
    pub fn checkpoint_values(&self) -> FxHashMap<String, Value> {
        self.entries
            .iter()
            .filter_map(|(name, channel)| channel.checkpoint().map(|v| (name.clone(), v)))
            .collect()
    }

    /// Release context resources, newest declaration last acquired first.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        for (_, channel) in self.entries.iter_mut().rev() {
            if let Channel::Context(ctx) = channel {
                ctx.release();
            }
        }
    }
}

impl Drop for Channels {
    fn drop(&mut self) {
        self.release();
    }
}
