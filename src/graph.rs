//! The declared surface of a computation: processes, channel specs, and
//! the input/output channel names.
//!
//! This is the registry the step loop schedules against. Higher-level
//! builder DSLs compile down to it; the engine itself only needs the
//! validated [`Graph`].

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::channels::ChannelSpec;
use crate::constants::{is_reserved, IS_LAST_STEP};
use crate::process::{Process, ProcessReads};

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("`{referrer}` references undeclared channel `{channel}`")]
    #[diagnostic(
        code(lockstep::graph::unknown_channel),
        help("Declare `{channel}` with `add_channel` before building the graph.")
    )]
    UnknownChannel { referrer: String, channel: String },

    #[error("channel name `{name}` is reserved")]
    #[diagnostic(
        code(lockstep::graph::reserved_channel),
        help("Names starting with `__` and `is_last_step` are maintained by the engine.")
    )]
    ReservedChannel { name: String },

    #[error("process name `{name}` is reserved")]
    #[diagnostic(code(lockstep::graph::reserved_process))]
    ReservedProcess { name: String },

    #[error("duplicate process `{name}`")]
    #[diagnostic(code(lockstep::graph::duplicate_process))]
    DuplicateProcess { name: String },

    #[error("duplicate channel `{name}`")]
    #[diagnostic(code(lockstep::graph::duplicate_channel))]
    DuplicateChannel { name: String },

    #[error("graph declares no input channels")]
    #[diagnostic(
        code(lockstep::graph::no_input),
        help("Call `with_input` so caller input can be mapped to channel writes.")
    )]
    NoInput,
}

/// A validated process registry plus its channel declarations.
///
/// Processes keep their insertion order; the scheduler uses it to break
/// ties and to order write application across tasks.
pub struct Graph {
    processes: Vec<(String, Process)>,
    process_index: FxHashMap<String, usize>,
    specs: Vec<(String, ChannelSpec)>,
    input_channels: Vec<String>,
    output_channels: Vec<String>,
}

impl Graph {
    pub fn builder() -> GraphBuilder {
        GraphBuilder::default()
    }

    pub fn process(&self, name: &str) -> Option<&Process> {
        self.process_index.get(name).map(|&i| &self.processes[i].1)
    }

    /// Processes in registry insertion order.
    pub fn processes(&self) -> impl Iterator<Item = (&str, &Process)> {
        self.processes.iter().map(|(n, p)| (n.as_str(), p))
    }

    /// Channel declarations in insertion order, including the
    /// auto-declared `is_last_step`.
    pub fn specs(&self) -> &[(String, ChannelSpec)] {
        &self.specs
    }

    pub fn input_channels(&self) -> &[String] {
        &self.input_channels
    }

    pub fn output_channels(&self) -> &[String] {
        &self.output_channels
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field(
                "processes",
                &self.processes.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .field(
                "channels",
                &self.specs.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .field("input", &self.input_channels)
            .field("output", &self.output_channels)
            .finish()
    }
}

/// Builder for [`Graph`]; validation happens at [`GraphBuilder::build`].
#[derive(Default)]
pub struct GraphBuilder {
    processes: Vec<(String, Process)>,
    specs: Vec<(String, ChannelSpec)>,
    input_channels: Vec<String>,
    output_channels: Vec<String>,
}

impl GraphBuilder {
    #[must_use]
    pub fn add_process(mut self, name: impl Into<String>, process: Process) -> Self {
        self.processes.push((name.into(), process));
        self
    }

    #[must_use]
    pub fn add_channel(mut self, name: impl Into<String>, spec: ChannelSpec) -> Self {
        self.specs.push((name.into(), spec));
        self
    }

    #[must_use]
    pub fn with_input<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_channels = channels.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_output<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_channels = channels.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(mut self) -> Result<Graph, GraphError> {
        let mut declared: FxHashMap<String, usize> = FxHashMap::default();
        for (name, _) in &self.specs {
            if is_reserved(name) || name.starts_with("__") {
                return Err(GraphError::ReservedChannel { name: name.clone() });
            }
            if declared.insert(name.clone(), 0).is_some() {
                return Err(GraphError::DuplicateChannel { name: name.clone() });
            }
        }
        // The engine maintains this one itself.
        self.specs
            .push((IS_LAST_STEP.to_string(), ChannelSpec::LastValue));
        declared.insert(IS_LAST_STEP.to_string(), 0);

        if self.input_channels.is_empty() {
            return Err(GraphError::NoInput);
        }

        let mut process_index = FxHashMap::default();
        for (i, (name, process)) in self.processes.iter().enumerate() {
            if name.starts_with("__") {
                return Err(GraphError::ReservedProcess { name: name.clone() });
            }
            if process_index.insert(name.clone(), i).is_some() {
                return Err(GraphError::DuplicateProcess { name: name.clone() });
            }
            for channel in process.triggers() {
                if !declared.contains_key(channel) {
                    return Err(GraphError::UnknownChannel {
                        referrer: format!("process `{name}`"),
                        channel: channel.clone(),
                    });
                }
            }
            let read_channels: Vec<&String> = match process.reads() {
                ProcessReads::Single { channel } => vec![channel],
                ProcessReads::Mapped { entries } => entries.iter().map(|(_, c)| c).collect(),
                ProcessReads::Batch { channel, .. } => vec![channel],
            };
            for channel in read_channels {
                if !declared.contains_key(channel) {
                    return Err(GraphError::UnknownChannel {
                        referrer: format!("process `{name}`"),
                        channel: channel.clone(),
                    });
                }
            }
        }

        for (role, channels) in [
            ("input", &self.input_channels),
            ("output", &self.output_channels),
        ] {
            for channel in channels {
                if !declared.contains_key(channel) {
                    return Err(GraphError::UnknownChannel {
                        referrer: format!("{role} declaration"),
                        channel: channel.clone(),
                    });
                }
            }
        }

        Ok(Graph {
            processes: self.processes,
            process_index,
            specs: self.specs,
            input_channels: self.input_channels,
            output_channels: self.output_channels,
        })
    }
}
