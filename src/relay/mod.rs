//! Distributed execution: the same step-loop semantics split across two
//! long-running role-workers connected by a durable message bus.
//!
//! The [`Orchestrator`] owns checkpoint transitions; the
//! [`ExecutorWorker`] runs one prepared task per message and persists
//! its writes. They share no memory: everything flows through the
//! [`Bus`] and the checkpointer. Delivery is at-least-once; applying is
//! at-most-once because pending writes are keyed by deterministic task
//! id and the checkpoint only advances once every scheduled task has a
//! write record.

pub mod bus;
pub mod executor;
pub mod messages;
pub mod orchestrator;

pub use bus::{Bus, BusError, BusRecord, InMemoryBus, Topic};
pub use executor::ExecutorWorker;
pub use messages::{MessageToExecutor, MessageToOrchestrator, TaskDescriptor};
pub use orchestrator::{Orchestrator, OrchestratorBatch};
