use serde_json::Value;

use super::errors::ChannelError;

/// Stores the most recent value written to the channel.
///
/// At most one write is accepted per step; two or more writes in the same
/// step fail with [`ChannelError::InvalidUpdate`]. The step-boundary
/// notification (an empty update) leaves the stored value untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct LastValue {
    name: String,
    value: Option<Value>,
}

impl LastValue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    pub fn update(&mut self, mut values: Vec<Value>) -> Result<(), ChannelError> {
        match values.len() {
            0 => Ok(()),
            1 => {
                self.value = values.pop();
                Ok(())
            }
            n => Err(ChannelError::invalid_update(
                &self.name,
                format!("LastValue received {n} writes in one step"),
            )),
        }
    }

    pub fn get(&self) -> Result<Value, ChannelError> {
        self.value
            .clone()
            .ok_or_else(|| ChannelError::empty(&self.name))
    }

    pub fn checkpoint(&self) -> Option<Value> {
        self.value.clone()
    }

    pub fn restore(&mut self, snapshot: Value) -> Result<(), ChannelError> {
        self.value = Some(snapshot);
        Ok(())
    }
}
