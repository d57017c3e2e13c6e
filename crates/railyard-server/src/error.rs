use railyard_coord::CoordError;
use railyard_manager::ManagerError;
use railyard_queue::QueueError;
use thiserror::Error;

/// Errors surfaced by [`crate::Daemon`] wiring — everything below it
/// (`railyard-manager`, `railyard-queue`, `railyard-coord`) already has
/// its own typed error; this adds only the one thing the daemon itself
/// can get wrong: addressing a tenant or pipeline the layout never
/// configured.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Manager(#[from] ManagerError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Coord(#[from] CoordError),

    #[error("no tenant with id {0} is configured")]
    UnknownTenant(u64),

    #[error("tenant {0} has no pipeline named {1}")]
    UnknownPipeline(u64, String),
}
