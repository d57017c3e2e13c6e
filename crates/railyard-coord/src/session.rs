use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A replica's liveness token in the coordination store. Every
/// ephemeral node — locks, leadership markers, node-allocation locks —
/// is owned by exactly one session and disappears when that session
/// expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The default lease length a session is granted on creation and on each
/// renewal, if the caller does not specify one.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(30);

/// Tracks one session's lease deadline. Lives inside a
/// [`crate::CoordinationStore`] implementation; not constructed
/// directly by callers.
#[derive(Debug, Clone, Copy)]
pub struct Lease {
    pub deadline: DateTime<Utc>,
}

impl Lease {
    #[must_use]
    pub fn starting_now(ttl: Duration) -> Self {
        Self {
            deadline: Utc::now() + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero()),
        }
    }

    #[must_use]
    pub fn renewed(ttl: Duration) -> Self {
        Self::starting_now(ttl)
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline
    }
}
