use serde_json::Value;

use super::errors::ChannelError;

/// Append-only buffer of every write across the run.
///
/// Reads return the whole buffer in write order. The boundary update is
/// a no-op.
#[derive(Debug, Clone, PartialEq)]
pub struct AppendStream {
    name: String,
    buffer: Vec<Value>,
}

impl AppendStream {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            buffer: Vec::new(),
        }
    }

    pub fn update(&mut self, values: Vec<Value>) -> Result<(), ChannelError> {
        self.buffer.extend(values);
        Ok(())
    }

    pub fn get(&self) -> Result<Value, ChannelError> {
        if self.buffer.is_empty() {
            return Err(ChannelError::empty(&self.name));
        }
        Ok(Value::Array(self.buffer.clone()))
    }

    pub fn checkpoint(&self) -> Option<Value> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(Value::Array(self.buffer.clone()))
        }
    }

    pub fn restore(&mut self, snapshot: Value) -> Result<(), ChannelError> {
        match snapshot {
            Value::Array(items) => {
                self.buffer = items;
                Ok(())
            }
            _ => Err(ChannelError::BadSnapshot {
                channel: self.name.clone(),
                expected: "a JSON array",
            }),
        }
    }
}
