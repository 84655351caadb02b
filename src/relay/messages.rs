//! Wire messages exchanged by the role-workers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::EngineError;
use crate::runtime::RunConfigSnapshot;

/// Wakes the orchestrator: either fresh caller input for a thread, or a
/// completion notification from the executor (`input: None`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageToOrchestrator {
    pub input: Option<Value>,
    pub config: RunConfigSnapshot,
    /// Side-effect task to dispatch once the run reaches a terminal
    /// status.
    #[serde(default, rename = "finally", skip_serializing_if = "Option::is_none")]
    pub finally_: Option<Box<MessageToExecutor>>,
}

/// Identifies one prepared task for the executor worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub path: Vec<String>,
    pub id: String,
    pub step: i64,
    /// Set when this dispatch resumes a thread rather than reacting to
    /// fresh input; the executor then skips tasks whose writes are
    /// already recorded.
    pub resuming: bool,
}

/// Instructs the executor worker to run one task of a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageToExecutor {
    pub config: RunConfigSnapshot,
    pub task: TaskDescriptor,
    #[serde(default, rename = "finally", skip_serializing_if = "Option::is_none")]
    pub finally_: Option<Box<MessageToExecutor>>,
}

pub(crate) fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, EngineError> {
    serde_json::to_vec(message).map_err(|e| EngineError::Codec {
        message: e.to_string(),
    })
}

pub(crate) fn decode<T: for<'de> Deserialize<'de>>(payload: &[u8]) -> Result<T, EngineError> {
    serde_json::from_slice(payload).map_err(|e| EngineError::Codec {
        message: e.to_string(),
    })
}
