use miette::Diagnostic;
use thiserror::Error;

/// Errors surfaced by channel reads, updates, and restores.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum ChannelError {
    /// Read of a channel that has never been written.
    ///
    /// The scheduler catches this silently for non-trigger reads; for a
    /// trigger channel it means the process is simply not runnable yet.
    #[error("channel `{channel}` is empty")]
    #[diagnostic(
        code(lockstep::channels::empty),
        help("Ensure a process writes to `{channel}` before it is read.")
    )]
    EmptyChannel { channel: String },

    /// The channel rejected the writes it received this step.
    #[error("invalid update for channel `{channel}`: {reason}")]
    #[diagnostic(
        code(lockstep::channels::invalid_update),
        help("Check how many processes write to `{channel}` within a single step.")
    )]
    InvalidUpdate { channel: String, reason: String },

    /// A checkpointed state did not have the shape this variant persists.
    #[error("unusable snapshot for channel `{channel}`: expected {expected}")]
    #[diagnostic(code(lockstep::channels::snapshot))]
    BadSnapshot {
        channel: String,
        expected: &'static str,
    },
}

impl ChannelError {
    pub fn empty(channel: impl Into<String>) -> Self {
        ChannelError::EmptyChannel {
            channel: channel.into(),
        }
    }

    pub fn invalid_update(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        ChannelError::InvalidUpdate {
            channel: channel.into(),
            reason: reason.into(),
        }
    }
}
