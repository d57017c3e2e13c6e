use railyard_coord::CoordError;
use railyard_dispatch::DispatchError;
use railyard_driver::DriverError;
use railyard_kernel::{KernelError, SpecError};
use railyard_queue::QueueError;
use thiserror::Error;

/// Errors surfaced by a running [`crate::PipelineManager`]. Most
/// variants wrap a lower layer's error unchanged; only
/// [`ManagerError::UnknownPipeline`] originates here.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("coordination store error: {0}")]
    Coord(#[from] CoordError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Kernel(#[from] KernelError),

    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error("pipeline state did not deserialize: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("no pipeline named {0} configured for this tenant")]
    UnknownPipeline(String),
}
