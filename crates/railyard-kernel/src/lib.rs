//! The pure, side-effect-free core of the Pipeline Manager: job-graph
//! freezing, the per-item advance function, AIMD window adjustment,
//! speculative reset, and trigger/requirement matching.
//!
//! Nothing here touches a coordination store, a clock, or randomness —
//! every function takes its inputs explicitly and returns the new state
//! plus a list of [`Effect`]s for the caller (`railyard-manager`) to
//! carry out, a pure-core/imperative-shell split.

mod advance;
mod effects;
mod error;
mod freeze;
mod requirements;
mod window;

pub use advance::{advance, apply_build_result, apply_node_failed, apply_node_fulfilled, speculative_reset};
pub use effects::{Effect, ItemResult};
pub use error::KernelError;
pub use freeze::{freeze_build_set, JobSpec};
pub use requirements::{requirement_satisfied, trigger_matches, SpecError};
pub use window::on_head_result;
