//! Caller-facing run configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;
use crate::io::StreamMode;

pub const DEFAULT_RECURSION_LIMIT: usize = 25;

/// Configuration for one run of a graph.
///
/// `thread_id` is the run's identity for the checkpointer: invoking the
/// same thread again resumes from its latest checkpoint.
///
/// ```
/// use std::time::Duration;
/// use lockstep::runtime::RunConfig;
///
/// let config = RunConfig::new("thread-1")
///     .with_recursion_limit(10)
///     .with_step_timeout(Duration::from_secs(30))
///     .with_interrupt_before(["approval"]);
/// assert_eq!(config.recursion_limit, 10);
/// ```
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub thread_id: String,
    /// Hard cap on supersteps; must be at least 1.
    pub recursion_limit: usize,
    /// Per-step timeout; on expiry the step's tasks are cancelled.
    pub step_timeout: Option<Duration>,
    /// Pause before any of these processes run.
    pub interrupt_before: Vec<String>,
    /// Pause after a step in which any of these processes ran.
    pub interrupt_after: Vec<String>,
    /// Which stream events the run emits.
    pub stream_modes: Vec<StreamMode>,
}

impl RunConfig {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            step_timeout: None,
            interrupt_before: Vec::new(),
            interrupt_after: Vec::new(),
            stream_modes: vec![StreamMode::Values],
        }
    }

    #[must_use]
    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    #[must_use]
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_interrupt_before<I, S>(mut self, processes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interrupt_before = processes.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_interrupt_after<I, S>(mut self, processes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interrupt_after = processes.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_stream_modes<I>(mut self, modes: I) -> Self
    where
        I: IntoIterator<Item = StreamMode>,
    {
        self.stream_modes = modes.into_iter().collect();
        self
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.thread_id.is_empty() {
            return Err(EngineError::InvalidConfig {
                message: "thread_id must not be empty".into(),
            });
        }
        if self.recursion_limit < 1 {
            return Err(EngineError::InvalidConfig {
                message: "recursion_limit must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// The serializable subset that travels through the checkpointer and
    /// the message bus.
    pub fn snapshot(&self) -> RunConfigSnapshot {
        RunConfigSnapshot {
            thread_id: self.thread_id.clone(),
            recursion_limit: self.recursion_limit,
            thread_ts: None,
            interrupt_before: self.interrupt_before.clone(),
            interrupt_after: self.interrupt_after.clone(),
        }
    }
}

/// The serializable run identity.
///
/// `thread_ts` pins a specific checkpoint; when absent, operations act
/// on the thread's latest checkpoint. The checkpointer threads it as the
/// parent link between consecutive checkpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfigSnapshot {
    pub thread_id: String,
    #[serde(default = "default_recursion_limit")]
    pub recursion_limit: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interrupt_before: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interrupt_after: Vec<String>,
}

fn default_recursion_limit() -> usize {
    DEFAULT_RECURSION_LIMIT
}

impl RunConfigSnapshot {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            thread_ts: None,
            interrupt_before: Vec::new(),
            interrupt_after: Vec::new(),
        }
    }

    #[must_use]
    pub fn at_checkpoint(mut self, thread_ts: impl Into<String>) -> Self {
        self.thread_ts = Some(thread_ts.into());
        self
    }

    /// Rehydrate a full `RunConfig` for loop execution.
    pub fn to_run_config(&self) -> RunConfig {
        RunConfig {
            thread_id: self.thread_id.clone(),
            recursion_limit: self.recursion_limit,
            step_timeout: None,
            interrupt_before: self.interrupt_before.clone(),
            interrupt_after: self.interrupt_after.clone(),
            stream_modes: Vec::new(),
        }
    }
}
