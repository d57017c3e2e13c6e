use std::sync::Arc;

use railyard_coord::{CancelToken, CoordError, CoordinationStore, LockHandle, SessionId};
use tokio::sync::watch;
use tracing::info;

use crate::error::QueueError;

/// Single-consumer leader election over a CS lock: one elected
/// consumer drains a queue at a time, losing bidders watch the lock
/// root and retry.
pub struct Election<S: CoordinationStore> {
    store: Arc<S>,
    lock_root: String,
}

impl<S: CoordinationStore> Election<S> {
    #[must_use]
    pub fn new(store: Arc<S>, lock_root: impl Into<String>) -> Self {
        Self { store, lock_root: lock_root.into() }
    }

    /// Attempts to become leader. `Ok(None)` means another session
    /// currently holds the lock; the caller should watch and retry
    /// rather than treat this as an error.
    pub fn try_become_leader(&self, session: SessionId) -> Result<Option<LockHandle>, QueueError> {
        match self.store.try_lock(&self.lock_root, session) {
            Ok(handle) => {
                info!(lock_root = %self.lock_root, "became leader");
                Ok(Some(handle))
            }
            Err(CoordError::LockHeld { .. }) => Ok(None),
            Err(other) => Err(other.into()),
        }
    }

    /// Resigns leadership ahead of session expiry.
    pub fn resign(&self, handle: &LockHandle) -> Result<(), QueueError> {
        self.store.unlock(handle).map_err(Into::into)
    }

    /// Fires whenever the lock root's children change, so a
    /// non-leader's wait loop wakes to retry [`Self::try_become_leader`]
    /// without polling.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.store.watch(&self.lock_root)
    }

    /// Blocks (respecting `cancel`) until this session either becomes
    /// leader or is told to stop. Mirrors "non-leaders watch and wait;
    /// losing leadership must stop the consumer cleanly (observed by a
    /// cancel flag + wake event)".
    pub async fn elect(&self, session: SessionId, cancel: &CancelToken) -> Result<Option<LockHandle>, QueueError> {
        loop {
            if let Some(handle) = self.try_become_leader(session)? {
                return Ok(Some(handle));
            }
            let mut rx = self.watch();
            tokio::select! {
                () = cancel.cancelled() => return Ok(None),
                res = rx.changed() => {
                    if res.is_err() {
                        return Ok(None);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use railyard_coord::MemoryStore;

    #[tokio::test]
    async fn second_bidder_loses_until_first_resigns() {
        let store = Arc::new(MemoryStore::new());
        let election = Election::new(store.clone(), "/locks/gerrit-leader");
        let s1 = store.begin_session();
        let s2 = store.begin_session();

        let handle1 = election.try_become_leader(s1).unwrap().expect("first bidder wins");
        assert!(election.try_become_leader(s2).unwrap().is_none(), "second bidder must lose while first holds the lock");

        election.resign(&handle1).unwrap();
        assert!(election.try_become_leader(s2).unwrap().is_some(), "second bidder wins after resignation");
    }

    #[tokio::test]
    async fn elect_returns_none_when_cancelled_while_waiting() {
        let store = Arc::new(MemoryStore::new());
        let election = Election::new(store.clone(), "/locks/gerrit-leader");
        let s1 = store.begin_session();
        let s2 = store.begin_session();
        let _handle1 = election.try_become_leader(s1).unwrap().unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        let result = election.elect(s2, &cancel).await.unwrap();
        assert!(result.is_none());
    }
}
