use thiserror::Error;

/// Errors surfaced by a [`crate::CoordinationStore`] implementation.
///
/// Callers distinguish transient-and-retryable failures from ones that
/// should propagate immediately via [`Retryable::is_transient`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoordError {
    #[error("node already exists at {path}")]
    NodeExists { path: String },

    #[error("no node at {path}")]
    NoNode { path: String },

    #[error("version conflict at {path}: expected {expected:?}, found {actual}")]
    VersionConflict {
        path: String,
        expected: Option<i64>,
        actual: i64,
    },

    #[error("session {session} has expired")]
    SessionExpired { session: String },

    #[error("lock at {path} is already held")]
    LockHeld { path: String },

    #[error("transient coordination-store failure: {message}")]
    Transient { message: String },
}

/// Classifies an error as transient or not.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for CoordError {
    fn is_transient(&self) -> bool {
        matches!(self, CoordError::Transient { .. } | CoordError::VersionConflict { .. })
    }
}
