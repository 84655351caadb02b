//! Mapping between caller values and channel reads/writes, and the
//! output event stream.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::channels::Channels;
use crate::errors::EngineError;
use crate::process::Task;

/// Which intermediate events a run emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamMode {
    /// End-of-step values of the output channels.
    Values,
    /// Per-process updates applied at each step.
    Updates,
    /// Checkpoint metadata at each step.
    Debug,
}

/// One event on the output stream, emitted in step order.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub mode: StreamMode,
    pub value: Value,
}

/// Per-run handle that forwards stream events to the caller.
///
/// A disabled emitter (no subscriber, as in the distributed workers)
/// drops everything; send failures after the receiver hung up are
/// ignored on purpose.
#[derive(Clone)]
pub(crate) struct StreamEmitter {
    tx: Option<flume::Sender<StreamEvent>>,
    modes: Vec<StreamMode>,
}

impl StreamEmitter {
    pub fn new(tx: flume::Sender<StreamEvent>, modes: Vec<StreamMode>) -> Self {
        Self {
            tx: Some(tx),
            modes,
        }
    }

    pub fn disabled() -> Self {
        Self {
            tx: None,
            modes: Vec::new(),
        }
    }

    pub fn wants(&self, mode: StreamMode) -> bool {
        self.tx.is_some() && self.modes.contains(&mode)
    }

    pub fn emit(&self, mode: StreamMode, value: Value) {
        if let Some(tx) = &self.tx {
            if self.modes.contains(&mode) {
                let _ = tx.send(StreamEvent { mode, value });
            }
        }
    }
}

/// Map caller input into channel writes.
///
/// A single declared input channel takes the value directly; multiple
/// input channels require a JSON object keyed by channel name, applied
/// in declaration order.
pub fn map_input(
    input_channels: &[String],
    input: Value,
) -> Result<Vec<(String, Value)>, EngineError> {
    match input_channels {
        [only] => Ok(vec![(only.clone(), input)]),
        _ => match input {
            Value::Object(mut fields) => {
                let mut writes = Vec::new();
                for channel in input_channels {
                    if let Some(value) = fields.remove(channel) {
                        writes.push((channel.clone(), value));
                    }
                }
                if let Some(unknown) = fields.keys().next() {
                    return Err(EngineError::Input {
                        message: format!("`{unknown}` is not a declared input channel"),
                    });
                }
                if writes.is_empty() {
                    return Err(EngineError::Input {
                        message: "input object matched no declared input channel".into(),
                    });
                }
                Ok(writes)
            }
            other => Err(EngineError::Input {
                message: format!(
                    "graph declares {} input channels; expected a JSON object, got {other}",
                    input_channels.len()
                ),
            }),
        },
    }
}

/// Current values of the output channels: the value itself for a single
/// output channel, otherwise an object of the readable ones. `None`
/// when nothing is readable yet.
pub fn read_output(output_channels: &[String], channels: &Channels) -> Option<Value> {
    match output_channels {
        [] => None,
        [only] => channels.read(only).ok(),
        many => {
            let fields: Map<String, Value> = many
                .iter()
                .filter_map(|name| channels.read(name).ok().map(|v| (name.clone(), v)))
                .collect();
            if fields.is_empty() {
                None
            } else {
                Some(Value::Object(fields))
            }
        }
    }
}

/// The `values` event for a step: emitted only when some write of the
/// step targeted an output channel.
pub fn map_output_values(
    output_channels: &[String],
    writes: &[(String, Value)],
    channels: &Channels,
) -> Option<Value> {
    if writes.iter().any(|(c, _)| output_channels.contains(c)) {
        read_output(output_channels, channels)
    } else {
        None
    }
}

/// The `updates` event for a step: each task's writes to output
/// channels, keyed by process name.
pub fn map_output_updates(output_channels: &[String], tasks: &[Task]) -> Option<Value> {
    let mut by_process = Map::new();
    for task in tasks {
        let mut update = Map::new();
        for (channel, value) in task.writes.lock().iter() {
            if output_channels.contains(channel) {
                update.insert(channel.clone(), value.clone());
            }
        }
        if !update.is_empty() {
            by_process.insert(task.name.clone(), Value::Object(update));
        }
    }
    if by_process.is_empty() {
        None
    } else {
        Some(Value::Object(by_process))
    }
}
