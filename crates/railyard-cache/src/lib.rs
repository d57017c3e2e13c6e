//! Change Cache: a process-local store of [`Change`] objects keyed by
//! [`ChangeKey`], backed by a [`CoordinationStore`] for cross-replica
//! visibility and CAS-bounded conflict resolution.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use railyard_coord::CoordinationStore;
use railyard_types::{Change, ChangeKey};
use thiserror::Error;

/// Bound on CAS-conflict retries inside [`ChangeCache::update_with_retry`].
pub const MAX_CAS_RETRIES: usize = 3;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("a change already exists at {0}")]
    ConcurrentUpdate(ChangeKey),

    #[error("no change cached at {0}")]
    NotFound(ChangeKey),

    #[error("mutator attempted to change the cache key from {from} to {to} without allow_key_update")]
    KeyMismatch { from: ChangeKey, to: ChangeKey },

    #[error("exhausted {MAX_CAS_RETRIES} CAS retries updating {0}")]
    RetryExhausted(ChangeKey),

    #[error("coordination store error: {0}")]
    Coord(#[from] railyard_coord::CoordError),

    #[error("mutator rejected the update: {0}")]
    Rejected(String),
}

fn cache_path(root: &str, key: &ChangeKey) -> String {
    format!("{root}/{key}")
}

struct Entry {
    change: Change,
    version: i64,
    /// The CS logical time of the query that produced this entry.
    ltime: u64,
}

/// Process-local cache of [`Change`] objects for one source connection.
/// Reads never touch the coordination store; writes go through CAS with
/// bounded retry so concurrent refreshers converge (invariant I3).
pub struct ChangeCache<S: CoordinationStore> {
    store: Arc<S>,
    root: String,
    local: Mutex<HashMap<ChangeKey, Entry>>,
}

impl<S: CoordinationStore> ChangeCache<S> {
    #[must_use]
    pub fn new(store: Arc<S>, root: impl Into<String>) -> Self {
        Self {
            store,
            root: root.into(),
            local: Mutex::new(HashMap::new()),
        }
    }

    /// Cache-only, non-blocking read.
    #[must_use]
    pub fn get(&self, key: &ChangeKey) -> Option<Change> {
        self.local.lock().unwrap().get(key).map(|e| e.change.clone())
    }

    /// The ltime this cache last observed for `key`, if any. Callers
    /// compare this against an incoming event's ltime to decide whether
    /// a refresh is required.
    #[must_use]
    pub fn ltime(&self, key: &ChangeKey) -> Option<u64> {
        self.local.lock().unwrap().get(key).map(|e| e.ltime)
    }

    /// Initial publish. Fails with [`CacheError::ConcurrentUpdate`] if
    /// the key already exists in CS.
    pub fn set(&self, key: &ChangeKey, change: Change, ltime: u64) -> Result<(), CacheError> {
        let path = cache_path(&self.root, key);
        let bytes = serde_json::to_vec(&change).expect("Change always serialises");
        let version = self
            .store
            .cas_write(&path, bytes, None)
            .map_err(|err| match err {
                railyard_coord::CoordError::NodeExists { .. } => CacheError::ConcurrentUpdate(key.clone()),
                other => CacheError::Coord(other),
            })?;
        self.local.lock().unwrap().insert(key.clone(), Entry { change, version, ltime });
        Ok(())
    }

    /// Loads current, applies `mutator`, CAS-writes, retrying on
    /// conflict up to [`MAX_CAS_RETRIES`] times. `mutator` may return a
    /// `Change` whose key differs from `key` only when `allow_key_update`
    /// is set — used when an event arrived without a patchset and the
    /// canonical patchset is discovered only on refresh.
    pub fn update_with_retry<F>(&self, key: &ChangeKey, ltime: u64, allow_key_update: bool, mutator: F) -> Result<Change, CacheError>
    where
        F: Fn(Option<&Change>) -> Result<Change, CacheError>,
    {
        let path = cache_path(&self.root, key);
        for _attempt in 0..MAX_CAS_RETRIES {
            let existing = self.store.read(&path)?;
            let current_change: Option<Change> = existing
                .as_ref()
                .map(|node| serde_json::from_slice(&node.data).expect("cached Change is always well-formed"));
            let expected_version = existing.as_ref().map(|node| node.version);

            let updated = mutator(current_change.as_ref())?;
            if !allow_key_update && updated.key() != key {
                return Err(CacheError::KeyMismatch {
                    from: key.clone(),
                    to: updated.key().clone(),
                });
            }

            let write_path = if updated.key() == key { path.clone() } else { cache_path(&self.root, updated.key()) };
            let bytes = serde_json::to_vec(&updated).expect("Change always serialises");
            match self.store.cas_write(&write_path, bytes, expected_version) {
                Ok(version) => {
                    let mut local = self.local.lock().unwrap();
                    if write_path != path {
                        local.remove(key);
                    }
                    local.insert(updated.key().clone(), Entry { change: updated.clone(), version, ltime });
                    return Ok(updated);
                }
                Err(railyard_coord::CoordError::VersionConflict { .. }) => continue,
                Err(other) => return Err(CacheError::Coord(other)),
            }
        }
        Err(CacheError::RetryExhausted(key.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use railyard_coord::MemoryStore;
    use railyard_types::{ChangeId, ChangeKind, MergeState, ReviewChange};
    use std::collections::BTreeSet;
    use std::sync::Barrier;

    fn sample_change(key: ChangeKey) -> Change {
        Change::Review(ReviewChange {
            key,
            branch: "main".into(),
            commit_message: String::new(),
            merge_state: MergeState::Open,
            wip: false,
            is_current_patchset: true,
            approvals: Vec::new(),
            submit_requirements: Vec::new(),
            missing_labels: BTreeSet::new(),
            content_hash: "h0".into(),
            git_needs: BTreeSet::new(),
            compat_needs: BTreeSet::new(),
            git_needed_by: BTreeSet::new(),
            compat_needed_by: BTreeSet::new(),
            change_id: ChangeId("Iabc".into()),
        })
    }

    #[test]
    fn set_then_get_round_trips() {
        let store = Arc::new(MemoryStore::new());
        let cache = ChangeCache::new(store, "/cache/gerrit");
        let key = ChangeKey::review("gerrit", "p1", "100", 1);
        cache.set(&key, sample_change(key.clone()), 1).unwrap();
        assert_eq!(cache.get(&key), Some(sample_change(key)));
    }

    #[test]
    fn set_twice_on_same_key_is_concurrent_update() {
        let store = Arc::new(MemoryStore::new());
        let cache = ChangeCache::new(store, "/cache/gerrit");
        let key = ChangeKey::review("gerrit", "p1", "100", 1);
        cache.set(&key, sample_change(key.clone()), 1).unwrap();
        let err = cache.set(&key, sample_change(key), 2).unwrap_err();
        assert!(matches!(err, CacheError::ConcurrentUpdate(_)));
    }

    #[test]
    fn update_with_retry_converges_under_concurrent_writers() {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(ChangeCache::new(store, "/cache/gerrit"));
        let key = ChangeKey::review("gerrit", "p1", "100", 1);
        cache.set(&key, sample_change(key.clone()), 1).unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let mut handles = Vec::new();
        for label in ["a", "b"] {
            let cache = cache.clone();
            let key = key.clone();
            let barrier = barrier.clone();
            handles.push(std::thread::spawn(move || {
                barrier.wait();
                cache
                    .update_with_retry(&key, 2, false, |existing| {
                        let mut change = existing.cloned().expect("change must already be cached");
                        if let Change::Review(c) = &mut change {
                            c.content_hash = format!("{}-{label}", c.content_hash);
                        }
                        Ok(change)
                    })
                    .unwrap();
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let Change::Review(c) = cache.get(&key).unwrap() else { panic!("expected review change") };
        assert!(c.content_hash.starts_with("h0-"), "one of the two writers must win: {}", c.content_hash);
    }

    #[test]
    fn key_update_is_rejected_unless_allowed() {
        let store = Arc::new(MemoryStore::new());
        let cache = ChangeCache::new(store, "/cache/gerrit");
        let key = ChangeKey::review("gerrit", "p1", "100", 1);
        cache.set(&key, sample_change(key.clone()), 1).unwrap();
        let new_key = ChangeKey::review("gerrit", "p1", "100", 2);
        let err = cache
            .update_with_retry(&key, 2, false, |_| Ok(sample_change(new_key.clone())))
            .unwrap_err();
        assert!(matches!(err, CacheError::KeyMismatch { .. }));
    }

    #[test]
    fn key_update_is_applied_when_allowed() {
        let store = Arc::new(MemoryStore::new());
        let cache = ChangeCache::new(store, "/cache/gerrit");
        let key = ChangeKey::review("gerrit", "p1", "100", 1);
        cache.set(&key, sample_change(key.clone()), 1).unwrap();
        let new_key = ChangeKey::review("gerrit", "p1", "100", 2);
        cache
            .update_with_retry(&key, 2, true, |_| Ok(sample_change(new_key.clone())))
            .unwrap();
        assert!(cache.get(&key).is_none());
        assert!(cache.get(&new_key).is_some());
    }
}
