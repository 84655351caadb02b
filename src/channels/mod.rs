//! Versioned communication channels between processes.
//!
//! A channel is a named slot over [`serde_json::Value`] with well-defined
//! update and read semantics. Processes never share state directly: every
//! write lands in a channel at a step boundary, and every read observes
//! the values the previous boundary left behind.
//!
//! Channels come in a fixed set of variants, realized as the [`Channel`]
//! tagged union so dispatch stays monomorphic:
//!
//! | Variant | Update semantics |
//! |---|---|
//! | [`LastValue`] | one write per step, keeps the latest |
//! | [`BinaryOperatorAggregate`] | folds the step's writes into the stored value |
//! | [`Inbox`] (plain or unique) | replaced by each step's writes, cleared at the boundary |
//! | [`SetUnion`] | union across the run, deduplicated |
//! | [`AppendStream`] | append-only buffer across the run |
//! | [`ContextValue`] | scoped resource held for the run |
//!
//! Live channels are built from [`ChannelSpec`] factories by the
//! [`manager::Channels`] scope, which also restores checkpointed state
//! and guarantees context resources are released on every exit path.

pub mod errors;
pub mod manager;

mod binop;
mod context;
mod inbox;
mod last_value;
mod set;
mod stream;

pub use binop::{BinaryOperator, BinaryOperatorAggregate};
pub use context::{ContextAcquire, ContextRelease, ContextValue};
pub use errors::ChannelError;
pub use inbox::Inbox;
pub use last_value::LastValue;
pub use manager::Channels;
pub use set::SetUnion;
pub use stream::AppendStream;

use std::sync::Arc;

use serde_json::Value;

/// Factory for a channel variant, held by the graph declaration.
///
/// Specs are cheap to clone; every run materializes fresh channel
/// instances from them and restores checkpointed state on top.
#[derive(Clone)]
pub enum ChannelSpec {
    LastValue,
    BinaryOperator { op: BinaryOperator, initial: Value },
    Inbox,
    UniqueInbox,
    Set,
    Stream,
    Context {
        acquire: ContextAcquire,
        release: Option<ContextRelease>,
    },
}

impl ChannelSpec {
    /// Fold the step's writes with `op`, starting from `initial`.
    pub fn binary_operator(
        op: impl Fn(Value, Value) -> Value + Send + Sync + 'static,
        initial: Value,
    ) -> Self {
        ChannelSpec::BinaryOperator {
            op: Arc::new(op),
            initial,
        }
    }

    /// Hold a scoped resource for the duration of the run.
    pub fn context(
        acquire: impl Fn() -> Value + Send + Sync + 'static,
        release: Option<ContextRelease>,
    ) -> Self {
        ChannelSpec::Context {
            acquire: Arc::new(acquire),
            release,
        }
    }

    /// Instantiate a live channel for `name`.
    pub fn build(&self, name: &str) -> Channel {
        match self {
            ChannelSpec::LastValue => Channel::LastValue(LastValue::new(name)),
            ChannelSpec::BinaryOperator { op, initial } => Channel::BinaryOperator(
                BinaryOperatorAggregate::new(name, op.clone(), initial.clone()),
            ),
            ChannelSpec::Inbox => Channel::Inbox(Inbox::new(name, false)),
            ChannelSpec::UniqueInbox => Channel::Inbox(Inbox::new(name, true)),
            ChannelSpec::Set => Channel::Set(SetUnion::new(name)),
            ChannelSpec::Stream => Channel::Stream(AppendStream::new(name)),
            ChannelSpec::Context { acquire, release } => {
                Channel::Context(ContextValue::acquire(name, acquire, release.clone()))
            }
        }
    }
}

impl std::fmt::Debug for ChannelSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ChannelSpec::LastValue => "LastValue",
            ChannelSpec::BinaryOperator { .. } => "BinaryOperator",
            ChannelSpec::Inbox => "Inbox",
            ChannelSpec::UniqueInbox => "UniqueInbox",
            ChannelSpec::Set => "Set",
            ChannelSpec::Stream => "Stream",
            ChannelSpec::Context { .. } => "Context",
        };
        f.write_str(label)
    }
}

/// A live channel instance owned by the step loop for the run.
#[derive(Debug, Clone)]
pub enum Channel {
    LastValue(LastValue),
    BinaryOperator(BinaryOperatorAggregate),
    Inbox(Inbox),
    Set(SetUnion),
    Stream(AppendStream),
    Context(ContextValue),
}

impl Channel {
    /// Apply the step's writes. An empty `values` is the step-boundary
    /// notification; variants that reset per step observe it.
    pub fn update(&mut self, values: Vec<Value>) -> Result<(), ChannelError> {
        match self {
            Channel::LastValue(c) => c.update(values),
            Channel::BinaryOperator(c) => c.update(values),
            Channel::Inbox(c) => c.update(values),
            Channel::Set(c) => c.update(values),
            Channel::Stream(c) => c.update(values),
            Channel::Context(c) => c.update(values),
        }
    }

    /// Read the current value.
    pub fn get(&self) -> Result<Value, ChannelError> {
        match self {
            Channel::LastValue(c) => c.get(),
            Channel::BinaryOperator(c) => c.get(),
            Channel::Inbox(c) => c.get(),
            Channel::Set(c) => c.get(),
            Channel::Stream(c) => c.get(),
            Channel::Context(c) => c.get(),
        }
    }

    /// Serializable state for the checkpoint, or `None` when there is
    /// nothing to persist (never written, or a context resource).
    pub fn checkpoint(&self) -> Option<Value> {
        match self {
            Channel::LastValue(c) => c.checkpoint(),
            Channel::BinaryOperator(c) => c.checkpoint(),
            Channel::Inbox(c) => c.checkpoint(),
            Channel::Set(c) => c.checkpoint(),
            Channel::Stream(c) => c.checkpoint(),
            Channel::Context(_) => None,
        }
    }

    /// Inverse of [`Channel::checkpoint`].
    pub fn restore(&mut self, snapshot: Value) -> Result<(), ChannelError> {
        match self {
            Channel::LastValue(c) => c.restore(snapshot),
            Channel::BinaryOperator(c) => c.restore(snapshot),
            Channel::Inbox(c) => c.restore(snapshot),
            Channel::Set(c) => c.restore(snapshot),
            Channel::Stream(c) => c.restore(snapshot),
            // Context resources live outside checkpoints; nothing to do.
            Channel::Context(_) => Ok(()),
        }
    }
}
