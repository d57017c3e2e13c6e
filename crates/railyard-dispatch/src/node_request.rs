use std::sync::Arc;

use railyard_coord::{CoordinationStore, CreateMode, LockHandle, SessionId};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use crate::error::DispatchError;

/// The lifecycle a node request moves through:
/// requested → pending → fulfilled | failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestState {
    Requested,
    Pending,
    Fulfilled,
    Failed,
}

impl RequestState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestState::Fulfilled | RequestState::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRequest {
    pub nodeset: Vec<String>,
    pub priority: i32,
    pub relative_priority: i32,
    pub state: RequestState,
    pub nodes: Vec<String>,
}

/// The Node Request Service: allocates nodes for a
/// job's nodeset and holds a CS ephemeral lock on each allocated node
/// for the lifetime of the build.
pub struct NodeRequestService<S: CoordinationStore> {
    store: Arc<S>,
    root: String,
}

impl<S: CoordinationStore> NodeRequestService<S> {
    #[must_use]
    pub fn new(store: Arc<S>, root: impl Into<String>) -> Self {
        Self { store, root: root.into() }
    }

    /// `submit(nodeset, priority, relative-priority)`: creates a CS
    /// sequential child. Priority is numeric (lower is sooner) with
    /// ties broken by the CS-assigned creation sequence, so the
    /// request itself carries the tie-break for free.
    pub fn submit(&self, nodeset: Vec<String>, priority: i32, relative_priority: i32, session: SessionId) -> Result<String, DispatchError> {
        let request = NodeRequest {
            nodeset,
            priority,
            relative_priority,
            state: RequestState::Requested,
            nodes: Vec::new(),
        };
        let bytes = serde_json::to_vec(&request).expect("NodeRequest always serialises");
        let path = self.store.create(&format!("{}/request-", self.root), bytes, CreateMode::PersistentSequential, session)?;
        debug!(path, priority, "submitted node request");
        Ok(path)
    }

    pub fn get(&self, request_id: &str) -> Result<NodeRequest, DispatchError> {
        let node = self.store.read(request_id)?.ok_or_else(|| DispatchError::NotFound(request_id.to_string()))?;
        Ok(serde_json::from_slice(&node.data)?)
    }

    fn update<F>(&self, request_id: &str, mutate: F) -> Result<(), DispatchError>
    where
        F: FnOnce(&mut NodeRequest),
    {
        let node = self.store.read(request_id)?.ok_or_else(|| DispatchError::NotFound(request_id.to_string()))?;
        let mut request: NodeRequest = serde_json::from_slice(&node.data)?;
        mutate(&mut request);
        let bytes = serde_json::to_vec(&request).expect("NodeRequest always serialises");
        self.store.cas_write(request_id, bytes, Some(node.version))?;
        Ok(())
    }

    pub fn mark_pending(&self, request_id: &str) -> Result<(), DispatchError> {
        self.update(request_id, |r| r.state = RequestState::Pending)
    }

    /// Marks `request_id` fulfilled with the allocated `nodes`. The
    /// caller is still responsible for taking [`Self::lock_node`] on
    /// each before use.
    pub fn fulfill(&self, request_id: &str, nodes: Vec<String>) -> Result<(), DispatchError> {
        self.update(request_id, |r| {
            r.state = RequestState::Fulfilled;
            r.nodes = nodes;
        })
    }

    pub fn fail(&self, request_id: &str) -> Result<(), DispatchError> {
        self.update(request_id, |r| r.state = RequestState::Failed)
    }

    /// `cancel`: deletes the request. If it was fulfilled mid-cancel,
    /// the allocated nodes' locks are left to expire with the session
    /// rather than force-released here.
    pub fn cancel(&self, request_id: &str) -> Result<(), DispatchError> {
        self.store.delete(request_id, None)?;
        Ok(())
    }

    /// Holds a CS ephemeral lock on `node` for the duration of the
    /// build; releasing it (drop or explicit unlock) frees the node.
    pub fn lock_node(&self, node: &str, session: SessionId) -> Result<LockHandle, DispatchError> {
        Ok(self.store.try_lock(&format!("{}/nodes/{node}", self.root), session)?)
    }

    pub fn unlock_node(&self, handle: &LockHandle) -> Result<(), DispatchError> {
        Ok(self.store.unlock(handle)?)
    }

    /// A watch on `request_id`'s own data, used to detect the
    /// requested → pending → fulfilled|failed transitions.
    #[must_use]
    pub fn watch(&self, request_id: &str) -> watch::Receiver<u64> {
        self.store.watch(request_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use railyard_coord::MemoryStore;

    fn service() -> (NodeRequestService<MemoryStore>, SessionId) {
        let (store, session) = store_with_session();
        (NodeRequestService::new(store, "/node-requests"), session)
    }

    fn store_with_session() -> (Arc<MemoryStore>, SessionId) {
        let store = Arc::new(MemoryStore::new());
        let session = store.begin_session();
        (store, session)
    }

    #[test]
    fn submit_then_fulfill_updates_state_and_nodes() {
        let (svc, session) = service();
        let id = svc.submit(vec!["ubuntu-noble".into()], 100, 0, session).unwrap();
        assert_eq!(svc.get(&id).unwrap().state, RequestState::Requested);

        svc.mark_pending(&id).unwrap();
        assert_eq!(svc.get(&id).unwrap().state, RequestState::Pending);

        svc.fulfill(&id, vec!["node-1".into()]).unwrap();
        let request = svc.get(&id).unwrap();
        assert_eq!(request.state, RequestState::Fulfilled);
        assert_eq!(request.nodes, vec!["node-1".to_string()]);
    }

    #[test]
    fn lock_node_is_exclusive_per_node() {
        let (store, session) = store_with_session();
        let session2 = store.begin_session();
        let svc = NodeRequestService::new(store, "/node-requests");
        let id = svc.submit(vec!["ubuntu-noble".into()], 100, 0, session).unwrap();
        svc.fulfill(&id, vec!["node-1".into()]).unwrap();

        let _held = svc.lock_node("node-1", session).unwrap();
        assert!(svc.lock_node("node-1", session2).is_err(), "a second session must not win the same node's lock");
    }

    #[test]
    fn cancel_removes_the_request() {
        let (svc, session) = service();
        let id = svc.submit(vec!["ubuntu-noble".into()], 100, 0, session).unwrap();
        svc.cancel(&id).unwrap();
        assert!(matches!(svc.get(&id), Err(DispatchError::NotFound(_))));
    }
}
