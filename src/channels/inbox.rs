use serde_json::Value;

use super::errors::ChannelError;

/// Holds exactly the writes delivered in the most recent step.
///
/// Each step's update *replaces* the held collection, so the empty
/// boundary update clears it: values written in step N are visible in
/// step N+1 and gone by step N+2. With `unique` set, duplicates within a
/// step collapse to their first occurrence; producer order is preserved
/// either way.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbox {
    name: String,
    unique: bool,
    queue: Vec<Value>,
}

impl Inbox {
    pub fn new(name: impl Into<String>, unique: bool) -> Self {
        Self {
            name: name.into(),
            unique,
            queue: Vec::new(),
        }
    }

    pub fn update(&mut self, values: Vec<Value>) -> Result<(), ChannelError> {
        self.queue = if self.unique {
            let mut seen: Vec<Value> = Vec::with_capacity(values.len());
            for value in values {
                if !seen.contains(&value) {
                    seen.push(value);
                }
            }
            seen
        } else {
            values
        };
        Ok(())
    }

    pub fn get(&self) -> Result<Value, ChannelError> {
        if self.queue.is_empty() {
            return Err(ChannelError::empty(&self.name));
        }
        Ok(Value::Array(self.queue.clone()))
    }

    pub fn checkpoint(&self) -> Option<Value> {
        if self.queue.is_empty() {
            None
        } else {
            Some(Value::Array(self.queue.clone()))
        }
    }

    pub fn restore(&mut self, snapshot: Value) -> Result<(), ChannelError> {
        match snapshot {
            Value::Array(items) => {
                self.queue = items;
                Ok(())
            }
            _ => Err(ChannelError::BadSnapshot {
                channel: self.name.clone(),
                expected: "a JSON array",
            }),
        }
    }
}
