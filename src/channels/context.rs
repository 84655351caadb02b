use std::sync::Arc;

use serde_json::Value;

use super::errors::ChannelError;

/// Produces the scoped resource when channels are materialized.
pub type ContextAcquire = Arc<dyn Fn() -> Value + Send + Sync>;
/// Tears the resource down when channels are released.
pub type ContextRelease = Arc<dyn Fn(Value) + Send + Sync>;

/// A scoped resource owned by the channels manager.
///
/// The resource is acquired when channels are materialized and released
/// exactly once when they are torn down, on every exit path. Reads return
/// the held resource; writes are rejected and the channel is excluded
/// from checkpoints.
#[derive(Clone)]
pub struct ContextValue {
    name: String,
    release: Option<ContextRelease>,
    value: Option<Value>,
}

impl ContextValue {
    pub fn acquire(name: impl Into<String>, acquire: &ContextAcquire, release: Option<ContextRelease>) -> Self {
        Self {
            name: name.into(),
            release,
            value: Some(acquire()),
        }
    }

    pub fn update(&mut self, values: Vec<Value>) -> Result<(), ChannelError> {
        if values.is_empty() {
            return Ok(());
        }
        Err(ChannelError::invalid_update(
            &self.name,
            "context channels cannot be written by processes",
        ))
    }

    pub fn get(&self) -> Result<Value, ChannelError> {
        self.value
            .clone()
            .ok_or_else(|| ChannelError::empty(&self.name))
    }

    /// Release the held resource. Safe to call more than once; only the
    /// first call observes the value.
    pub fn release(&mut self) {
        if let (Some(value), Some(release)) = (self.value.take(), self.release.as_ref()) {
            release(value);
        } else {
            self.value = None;
        }
    }
}

impl std::fmt::Debug for ContextValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextValue")
            .field("name", &self.name)
            .field("held", &self.value.is_some())
            .finish_non_exhaustive()
    }
}
