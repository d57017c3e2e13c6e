use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use tokio::sync::watch;

use crate::error::CoordError;
use crate::session::{Lease, SessionId, DEFAULT_LEASE};
use crate::store::{CoordinationStore, CreateMode, LockHandle, NodeData};

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => "/",
    }
}

fn child_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

struct StoreState {
    nodes: HashMap<String, NodeData>,
    ephemeral_owner: HashMap<String, SessionId>,
    sessions: HashMap<SessionId, Lease>,
    sequence_counters: HashMap<String, u64>,
    watches: HashMap<String, watch::Sender<u64>>,
}

impl StoreState {
    fn watch_sender(&mut self, path: &str) -> &watch::Sender<u64> {
        self.watches.entry(path.to_string()).or_insert_with(|| watch::channel(0).0)
    }

    fn bump(&mut self, path: &str) {
        let sender = self.watch_sender(path);
        let next = *sender.borrow() + 1;
        let _ = sender.send(next);
    }

    fn session_alive(&self, session: SessionId) -> bool {
        self.sessions.get(&session).is_some_and(|lease| !lease.is_expired(Utc::now()))
    }
}

/// A production-shaped, in-process [`CoordinationStore`]. Not a
/// network client: it exists so the replicated pipeline core can be
/// exercised deterministically in tests and in `railyard-sim` without
/// standing up a real coordination service.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState {
                nodes: HashMap::new(),
                ephemeral_owner: HashMap::new(),
                sessions: HashMap::new(),
                sequence_counters: HashMap::new(),
                watches: HashMap::new(),
            }),
        }
    }

    fn next_sequence(state: &mut StoreState, parent: &str) -> u64 {
        let counter = state.sequence_counters.entry(parent.to_string()).or_insert(0);
        let value = *counter;
        *counter += 1;
        value
    }
}

impl CoordinationStore for MemoryStore {
    fn begin_session(&self) -> SessionId {
        let id = SessionId::new();
        let mut state = self.state.lock().unwrap();
        state.sessions.insert(id, Lease::starting_now(DEFAULT_LEASE));
        id
    }

    fn renew_session(&self, session: SessionId) -> Result<(), CoordError> {
        let mut state = self.state.lock().unwrap();
        if !state.session_alive(session) {
            return Err(CoordError::SessionExpired { session: session.to_string() });
        }
        state.sessions.insert(session, Lease::renewed(DEFAULT_LEASE));
        Ok(())
    }

    fn expire_session(&self, session: SessionId) {
        let mut state = self.state.lock().unwrap();
        state.sessions.remove(&session);
        let owned: Vec<String> = state
            .ephemeral_owner
            .iter()
            .filter(|(_, owner)| **owner == session)
            .map(|(path, _)| path.clone())
            .collect();
        for path in owned {
            state.nodes.remove(&path);
            state.ephemeral_owner.remove(&path);
            let parent = parent_of(&path).to_string();
            state.bump(&parent);
        }
    }

    fn create(&self, path: &str, data: Vec<u8>, mode: CreateMode, session: SessionId) -> Result<String, CoordError> {
        let mut state = self.state.lock().unwrap();
        if mode.is_ephemeral() && !state.session_alive(session) {
            return Err(CoordError::SessionExpired { session: session.to_string() });
        }
        let final_path = if mode.is_sequential() {
            let parent = parent_of(path);
            let seq = Self::next_sequence(&mut state, parent);
            format!("{path}{seq:010}")
        } else {
            path.to_string()
        };
        if state.nodes.contains_key(&final_path) {
            return Err(CoordError::NodeExists { path: final_path });
        }
        state.nodes.insert(final_path.clone(), NodeData { data, version: 0 });
        if mode.is_ephemeral() {
            state.ephemeral_owner.insert(final_path.clone(), session);
        }
        let parent = parent_of(&final_path).to_string();
        state.bump(&parent);
        Ok(final_path)
    }

    fn read(&self, path: &str) -> Result<Option<NodeData>, CoordError> {
        let state = self.state.lock().unwrap();
        Ok(state.nodes.get(path).cloned())
    }

    fn cas_write(&self, path: &str, data: Vec<u8>, expected_version: Option<i64>) -> Result<i64, CoordError> {
        let mut state = self.state.lock().unwrap();
        match (state.nodes.get(path).cloned(), expected_version) {
            (None, None) => {
                state.nodes.insert(path.to_string(), NodeData { data, version: 0 });
                state.bump(path);
                Ok(0)
            }
            (None, Some(_)) => Err(CoordError::NoNode { path: path.to_string() }),
            (Some(existing), expected) => {
                if expected != Some(existing.version) {
                    return Err(CoordError::VersionConflict {
                        path: path.to_string(),
                        expected,
                        actual: existing.version,
                    });
                }
                let new_version = existing.version + 1;
                state.nodes.insert(path.to_string(), NodeData { data, version: new_version });
                state.bump(path);
                Ok(new_version)
            }
        }
    }

    fn delete(&self, path: &str, expected_version: Option<i64>) -> Result<(), CoordError> {
        let mut state = self.state.lock().unwrap();
        let Some(existing) = state.nodes.get(path) else {
            return Ok(()); // ack-style delete is idempotent
        };
        if let Some(expected) = expected_version {
            if existing.version != expected {
                return Err(CoordError::VersionConflict {
                    path: path.to_string(),
                    expected: Some(expected),
                    actual: existing.version,
                });
            }
        }
        state.nodes.remove(path);
        state.ephemeral_owner.remove(path);
        let parent = parent_of(path).to_string();
        state.bump(&parent);
        Ok(())
    }

    fn children(&self, path: &str) -> Result<Vec<String>, CoordError> {
        let state = self.state.lock().unwrap();
        let prefix = if path.ends_with('/') { path.to_string() } else { format!("{path}/") };
        let mut names: Vec<String> = state
            .nodes
            .keys()
            .filter_map(|key| {
                let rest = key.strip_prefix(&prefix)?;
                if rest.is_empty() || rest.contains('/') {
                    None
                } else {
                    Some(rest.to_string())
                }
            })
            .collect();
        names.sort();
        Ok(names)
    }

    fn watch(&self, path: &str) -> watch::Receiver<u64> {
        let mut state = self.state.lock().unwrap();
        state.watch_sender(path).subscribe()
    }

    fn try_lock(&self, lock_root: &str, session: SessionId) -> Result<LockHandle, CoordError> {
        let mut state = self.state.lock().unwrap();
        if !state.session_alive(session) {
            return Err(CoordError::SessionExpired { session: session.to_string() });
        }
        let candidate_prefix = format!("{lock_root}/lock-");
        let seq = Self::next_sequence(&mut state, &candidate_prefix);
        let candidate = format!("{candidate_prefix}{seq:010}");
        state.nodes.insert(candidate.clone(), NodeData { data: Vec::new(), version: 0 });
        state.ephemeral_owner.insert(candidate.clone(), session);

        let prefix = format!("{lock_root}/");
        let mut siblings: Vec<String> = state
            .nodes
            .keys()
            .filter(|key| key.starts_with(&prefix) && !key[prefix.len()..].contains('/'))
            .cloned()
            .collect();
        siblings.sort();

        if siblings.first() == Some(&candidate) {
            state.bump(lock_root);
            Ok(LockHandle { path: candidate, session })
        } else {
            state.nodes.remove(&candidate);
            state.ephemeral_owner.remove(&candidate);
            Err(CoordError::LockHeld { path: lock_root.to_string() })
        }
    }

    fn unlock(&self, handle: &LockHandle) -> Result<(), CoordError> {
        let mut state = self.state.lock().unwrap();
        state.nodes.remove(&handle.path);
        state.ephemeral_owner.remove(&handle.path);
        let parent = parent_of(&handle.path).to_string();
        state.bump(&parent);
        Ok(())
    }
}
