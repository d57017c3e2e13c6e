//! Core data model for the pipeline scheduling core.
//!
//! This crate is deliberately free of I/O: every type here is a plain
//! value, constructed and compared by its fields. Components that need
//! to mutate one of these (the change cache, the pipeline manager) do so
//! by producing a new value and writing it back through an optimistic
//! concurrency layer (`railyard-cache`, `railyard-coord`) rather than
//! mutating shared state in place.
//!
//! Modules:
//!   - [`change`] — `Change`, `ChangeKey`, dependency edges
//!   - [`queue_item`] — `QueueItem`, `ItemStatus`
//!   - [`buildset`] — `BuildSet`, `Job`, `JobOutcome`
//!   - [`pipeline`] — `Pipeline`, `ManagerKind`, `Precedence`, `Window`
//!   - [`tenant`] — `Tenant`
//!   - [`event`] — wire-shaped event and trigger-event payloads

mod buildset;
mod change;
mod event;
mod pipeline;
mod queue_item;
mod tenant;

pub use buildset::{BuildSet, Job, JobOutcome};
pub use change::{
    Approval, Change, ChangeId, ChangeKey, ChangeKind, MergeState, RefChange, ReviewChange, SubmitRequirement,
    SubmitRequirementStatus,
};
pub use event::{Event, TriggerEvent, TriggerEventType};
pub use pipeline::{ManagerKind, Pipeline, Precedence, ReporterRef, RequirementSpec, TriggerSpec, Window};
pub use queue_item::{ItemStatus, QueueItem};
pub use tenant::{PipelineId, ProjectId, Tenant, TenantId};
