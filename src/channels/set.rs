use serde_json::Value;

use super::errors::ChannelError;

/// Union of every write across the run, deduplicated by value equality.
///
/// Insertion order is kept so reads are deterministic. The boundary
/// update is a no-op; the set is never cleared.
#[derive(Debug, Clone, PartialEq)]
pub struct SetUnion {
    name: String,
    items: Vec<Value>,
}

impl SetUnion {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
        }
    }

    pub fn update(&mut self, values: Vec<Value>) -> Result<(), ChannelError> {
        for value in values {
            if !self.items.contains(&value) {
                self.items.push(value);
            }
        }
        Ok(())
    }

    pub fn get(&self) -> Result<Value, ChannelError> {
        if self.items.is_empty() {
            return Err(ChannelError::empty(&self.name));
        }
        Ok(Value::Array(self.items.clone()))
    }

    pub fn checkpoint(&self) -> Option<Value> {
        if self.items.is_empty() {
            None
        } else {
            Some(Value::Array(self.items.clone()))
        }
    }

    pub fn restore(&mut self, snapshot: Value) -> Result<(), ChannelError> {
        match snapshot {
            Value::Array(items) => {
                self.items = items;
                Ok(())
            }
            _ => Err(ChannelError::BadSnapshot {
                channel: self.name.clone(),
                expected: "a JSON array",
            }),
        }
    }
}
