//! # Lockstep: a bulk-synchronous dataflow engine
//!
//! Lockstep runs a user-defined computation expressed as named
//! processes communicating exclusively through named, versioned
//! channels, in the Bulk Synchronous Parallel / Pregel style:
//!
//! - computation proceeds in discrete **supersteps**;
//! - writes produced in step N are folded into channels atomically at
//!   the boundary and become visible in step N+1;
//! - a process runs in a step iff one of its trigger channels advanced
//!   past the version it last reacted to;
//! - every boundary persists a **checkpoint**, so runs pause at
//!   configured interrupt points and resume exactly where they stopped.
//!
//! ## A run in five lines
//!
//! ```no_run
//! use lockstep::channels::ChannelSpec;
//! use lockstep::graph::Graph;
//! use lockstep::process::Process;
//! use lockstep::runtime::{Engine, RunConfig};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), lockstep::errors::EngineError> {
//! let graph = Graph::builder()
//!     .add_channel("input", ChannelSpec::LastValue)
//!     .add_channel("output", ChannelSpec::LastValue)
//!     .add_process(
//!         "double",
//!         Process::subscribe_to("input").run(|v, ctx| async move {
//!             ctx.write("output", json!(v.as_i64().unwrap_or(0) * 2));
//!             Ok(())
//!         }),
//!     )
//!     .with_input(["input"])
//!     .with_output(["output"])
//!     .build()?;
//! let outcome = Engine::new(graph)
//!     .invoke(Some(json!(21)), RunConfig::new("t1"))
//!     .await?;
//! assert_eq!(outcome.output, Some(json!(42)));
//! # Ok(())
//! # }
//! ```
//!
//! ## Module guide
//!
//! - [`channels`] — the channel variants and their scoped manager
//! - [`checkpoint`] / [`checkpointers`] — snapshots and persistence
//! - [`graph`] / [`process`] — the declared surface the loop schedules
//! - [`algo`] — apply-writes, task preparation, interrupt gating
//! - [`runtime`] — the step loop and the local [`runtime::Engine`]
//! - [`relay`] — the distributed orchestrator/executor pair and the bus
//! - [`io`] — input mapping and the `values`/`updates`/`debug` stream

pub mod algo;
pub mod channels;
pub mod checkpoint;
pub mod checkpointers;
pub mod constants;
pub mod errors;
pub mod graph;
pub mod io;
pub mod process;
pub mod relay;
pub mod runtime;
pub mod telemetry;
