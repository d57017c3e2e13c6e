use railyard_coord::CoordError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("coordination store error: {0}")]
    Coord(#[from] CoordError),

    #[error("request payload did not deserialize: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("no such request at {0}")]
    NotFound(String),
}
