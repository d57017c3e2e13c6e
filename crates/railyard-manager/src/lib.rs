//! The Pipeline Manager imperative shell: owns one
//! tenant/pipeline's main loop, turning the pure `railyard-kernel`
//! core's `Effect`s into coordination-store writes, node/build
//! requests, and reports. This is the layer `railyard-kernel`
//! deliberately stays free of: a clock, randomness, and every I/O
//! boundary this workspace touches live here instead.

mod error;
mod events;
mod manager;
pub mod paths;
mod state;

pub use error::ManagerError;
pub use events::{ManagementEvent, ResultEvent};
pub use manager::PipelineManager;
pub use state::{PipelineState, PipelineStateStore};
