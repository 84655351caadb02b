use std::sync::Arc;

use serde_json::Value;

use super::errors::ChannelError;

/// Associative fold applied to each write of a step, in producer order.
pub type BinaryOperator = Arc<dyn Fn(Value, Value) -> Value + Send + Sync>;

/// Folds every write of a step into the stored value with a supplied
/// associative operator, starting from an initial value.
///
/// Reads always succeed: a channel that has never been written returns
/// the initial value.
#[derive(Clone)]
pub struct BinaryOperatorAggregate {
    name: String,
    op: BinaryOperator,
    value: Value,
}

impl BinaryOperatorAggregate {
    pub fn new(name: impl Into<String>, op: BinaryOperator, initial: Value) -> Self {
        Self {
            name: name.into(),
            op,
            value: initial,
        }
    }

    pub fn update(&mut self, values: Vec<Value>) -> Result<(), ChannelError> {
        for value in values {
            let current = std::mem::replace(&mut self.value, Value::Null);
            self.value = (self.op)(current, value);
        }
        Ok(())
    }

    pub fn get(&self) -> Result<Value, ChannelError> {
        Ok(self.value.clone())
    }

    pub fn checkpoint(&self) -> Option<Value> {
        Some(self.value.clone())
    }

    pub fn restore(&mut self, snapshot: Value) -> Result<(), ChannelError> {
        self.value = snapshot;
        Ok(())
    }
}

impl std::fmt::Debug for BinaryOperatorAggregate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinaryOperatorAggregate")
            .field("name", &self.name)
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}
