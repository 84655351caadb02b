//! Channel names and sentinels reserved by the engine.

/// Versions-seen key used to gate interrupt re-firing across resumes.
///
/// The step loop records, under this key, the channel versions that were
/// current when a paused run was resumed with empty input. An interrupt
/// only fires again once some channel has advanced past those versions.
pub const INTERRUPT: &str = "__interrupt__";

/// Pending-write channel used by the distributed executor to surface a
/// task failure to the orchestrator.
pub const ERROR: &str = "__error__";

/// Pending-write sentinel recorded by the orchestrator once a task has
/// been handed to the executor topic, so a later wake-up does not
/// dispatch the same task twice.
pub const SCHEDULED: &str = "__scheduled__";

/// Pending-write sentinel recording that a task completed without
/// producing any writes, so the step can still close over it.
pub const NO_WRITES: &str = "__no_writes__";

/// Auto-declared `LastValue` channel holding whether the upcoming step is
/// the last one `recursion_limit` permits.
pub const IS_LAST_STEP: &str = "is_last_step";

/// Names user processes may neither declare nor write to.
pub const RESERVED_CHANNELS: [&str; 5] = [INTERRUPT, ERROR, SCHEDULED, NO_WRITES, IS_LAST_STEP];

/// Returns `true` for channel names owned by the engine.
pub fn is_reserved(name: &str) -> bool {
    RESERVED_CHANNELS.contains(&name)
}
