//! Process declarations and the task handle they execute as.
//!
//! A process is a named computation triggered by writes to one or more
//! channels. Its declaration carries three things: the trigger channels
//! whose version advancement schedules it, the read form that assembles
//! its input value, and the async body that runs each time it fires.
//!
//! Bodies communicate only through the [`TaskContext`]: reads observe an
//! immutable snapshot of the step-start channel values, and writes land
//! in a per-task buffer that the loop folds into channels at the next
//! step boundary.
//!
//! ```
//! use lockstep::process::Process;
//! use serde_json::json;
//!
//! let increment = Process::subscribe_to("input").run(|value, ctx| async move {
//!     let n = value.as_i64().unwrap_or(0);
//!     ctx.write("output", json!(n + 1));
//!     Ok(())
//! });
//! assert_eq!(increment.triggers(), ["input"]);
//! ```

use std::sync::Arc;

use futures_util::future::BoxFuture;
use miette::Diagnostic;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;

use crate::channels::ChannelError;

/// Errors raised by process bodies. Fatal for the step: the first
/// failing task cancels its siblings.
#[derive(Debug, Error, Diagnostic)]
pub enum ProcessError {
    /// Expected input data is missing from the assembled value.
    #[error("missing expected input: {what}")]
    #[diagnostic(
        code(lockstep::process::missing_input),
        help("Check that an upstream process produced `{what}`.")
    )]
    MissingInput { what: &'static str },

    /// Free-form application failure.
    #[error("{0}")]
    #[diagnostic(code(lockstep::process::message))]
    Message(String),

    #[error(transparent)]
    #[diagnostic(code(lockstep::process::serde))]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    #[diagnostic(code(lockstep::process::channel))]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    #[diagnostic(code(lockstep::process::other))]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Append-only sink for one task's writes, safe for concurrent append.
pub type WriteBuffer = Arc<Mutex<Vec<(String, Value)>>>;

/// The async body of a process.
pub type ProcessBody =
    Arc<dyn Fn(Value, TaskContext) -> BoxFuture<'static, Result<(), ProcessError>> + Send + Sync>;

/// Execution context handed to a process body.
#[derive(Clone)]
pub struct TaskContext {
    snapshot: Arc<FxHashMap<String, Value>>,
    writes: WriteBuffer,
}

impl TaskContext {
    pub(crate) fn new(snapshot: Arc<FxHashMap<String, Value>>, writes: WriteBuffer) -> Self {
        Self { snapshot, writes }
    }

    /// Read a channel's value as of the start of this step.
    pub fn read(&self, channel: &str) -> Result<Value, ChannelError> {
        self.snapshot
            .get(channel)
            .cloned()
            .ok_or_else(|| ChannelError::empty(channel))
    }

    /// Queue a write; it becomes visible to other processes at the next
    /// step boundary.
    pub fn write(&self, channel: impl Into<String>, value: Value) {
        self.writes.lock().push((channel.into(), value));
    }
}

/// How a process assembles its input value from channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessReads {
    /// The value of a single channel, passed directly.
    Single { channel: String },
    /// A JSON object of `{key: channel value}` entries.
    Mapped { entries: Vec<(String, String)> },
    /// The elements of an inbox-like channel, optionally wrapped as
    /// `{key: element}` each.
    Batch {
        channel: String,
        key: Option<String>,
    },
}

/// A declared process: triggers, read form, and body.
#[derive(Clone)]
pub struct Process {
    triggers: Vec<String>,
    reads: ProcessReads,
    body: ProcessBody,
}

impl Process {
    /// Subscribe to a single channel; the body receives its value
    /// directly each time the channel is updated.
    pub fn subscribe_to(channel: impl Into<String>) -> ProcessBuilder {
        let channel = channel.into();
        ProcessBuilder {
            triggers: vec![channel.clone()],
            reads: ProcessReads::Single { channel },
        }
    }

    /// Subscribe to several channels; the body receives a JSON object
    /// keyed by channel name, and runs when any of them is updated.
    pub fn subscribe_to_many<I, S>(channels: I) -> ProcessBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let triggers: Vec<String> = channels.into_iter().map(Into::into).collect();
        let entries = triggers.iter().map(|c| (c.clone(), c.clone())).collect();
        ProcessBuilder {
            triggers,
            reads: ProcessReads::Mapped { entries },
        }
    }

    /// Subscribe to the contents of an inbox-like channel; the body
    /// receives the collection gathered in the previous step, each
    /// element wrapped as `{key: element}` when a key is given.
    pub fn subscribe_to_each(
        channel: impl Into<String>,
        key: Option<&str>,
    ) -> ProcessBuilder {
        let channel = channel.into();
        ProcessBuilder {
            triggers: vec![channel.clone()],
            reads: ProcessReads::Batch {
                channel,
                key: key.map(str::to_string),
            },
        }
    }

    pub fn triggers(&self) -> &[String] {
        &self.triggers
    }

    pub fn reads(&self) -> &ProcessReads {
        &self.reads
    }

    pub(crate) fn body(&self) -> ProcessBody {
        self.body.clone()
    }
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("triggers", &self.triggers)
            .field("reads", &self.reads)
            .finish_non_exhaustive()
    }
}

/// Builder produced by the `subscribe_*` constructors.
pub struct ProcessBuilder {
    triggers: Vec<String>,
    reads: ProcessReads,
}

impl ProcessBuilder {
    /// Add a non-trigger read: the channel's value is assembled into the
    /// input object under `key`, but updates to it do not schedule the
    /// process. Only meaningful for the mapped read form; a single-
    /// channel subscription is widened into a mapped one.
    #[must_use]
    pub fn read_also(mut self, key: impl Into<String>, channel: impl Into<String>) -> Self {
        let entry = (key.into(), channel.into());
        self.reads = match self.reads {
            ProcessReads::Mapped { mut entries } => {
                entries.push(entry);
                ProcessReads::Mapped { entries }
            }
            ProcessReads::Single { channel } => ProcessReads::Mapped {
                entries: vec![(channel.clone(), channel), entry],
            },
            batch @ ProcessReads::Batch { .. } => batch,
        };
        self
    }

    /// Attach the async body and finish the declaration.
    pub fn run<F, Fut>(self, body: F) -> Process
    where
        F: Fn(Value, TaskContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), ProcessError>> + Send + 'static,
    {
        Process {
            triggers: self.triggers,
            reads: self.reads,
            body: Arc::new(move |value, ctx| Box::pin(body(value, ctx))),
        }
    }
}

/// One schedulable execution of a process in a given step.
///
/// The id is deterministic from `(checkpoint id, step, process name,
/// path)` so the same task is identifiable across workers and restarts.
#[derive(Debug, Clone)]
pub struct Task {
    pub name: String,
    pub input: Value,
    pub path: Vec<String>,
    pub id: String,
    pub writes: WriteBuffer,
}

impl Task {
    /// Whether any write record (including the scheduled marker) exists
    /// for this task yet.
    pub fn has_writes(&self) -> bool {
        !self.writes.lock().is_empty()
    }
}
