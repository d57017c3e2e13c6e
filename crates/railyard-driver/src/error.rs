use railyard_coord::Retryable;
use railyard_types::ChangeKey;
use thiserror::Error;

/// Errors raised by a [`crate::SourceDriver`] implementation.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The dependency recursion exceeded `max_dependencies`. This is a
    /// *processing exception*: the event is acked and the item is
    /// rejected, not retried.
    #[error("change {0} has too many dependencies")]
    TooManyDependencies(ChangeKey),

    /// A 5xx/network/SSH failure: bounded retry with exponential
    /// backoff is appropriate.
    #[error("transient upstream failure querying {0}: {message}")]
    Transient { key: ChangeKey, message: String },

    /// A 409 from the upstream: not retried; for merge attempts this
    /// degrades to "change may already be merged", re-checked on next
    /// refresh.
    #[error("upstream conflict for {0}: {message}")]
    Conflict { key: ChangeKey, message: String },

    /// A 400 from the upstream: not retried, logged at error, and
    /// reporting's phase-2 stops for the item.
    #[error("bad request to upstream for {0}: {message}")]
    BadRequest { key: ChangeKey, message: String },

    #[error("change cache error: {0}")]
    Cache(#[from] railyard_cache::CacheError),
}

impl Retryable for DriverError {
    fn is_transient(&self) -> bool {
        matches!(self, DriverError::Transient { .. })
    }
}
