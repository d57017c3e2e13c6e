use railyard_coord::CoordError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("coordination store error: {0}")]
    Coord(#[from] CoordError),

    #[error("event payload did not deserialize: {0}")]
    Decode(#[from] serde_json::Error),
}
