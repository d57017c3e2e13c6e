use std::collections::BTreeMap;
use std::sync::Arc;

use railyard_coord::{CoordError, CoordinationStore, CreateMode, LockHandle, SessionId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DispatchError;

/// States a build request moves through: requested →
/// running → paused? → completed. Terminal deletion happens only
/// after the scheduler acks the result, so `Completed` is observable
/// before the node disappears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildRequestState {
    Requested,
    Running,
    Paused,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRequest {
    pub zone: Option<String>,
    pub params: BTreeMap<String, String>,
    pub state: BuildRequestState,
    pub cancel_requested: bool,
    pub resume_requested: bool,
}

fn zone_path(exec_root: &str, zone: Option<&str>) -> String {
    match zone {
        Some(zone) => format!("{exec_root}/zones/{zone}"),
        None => format!("{exec_root}/unzoned"),
    }
}

/// Zoned Executor Dispatch: one build-request queue per
/// zone (or the `unzoned` fallback), executors claiming requests by
/// lock, and advisory cancel/resume sub-nodes an executor observes
/// mid-build.
pub struct ExecutorDispatch<S: CoordinationStore> {
    store: Arc<S>,
    exec_root: String,
}

impl<S: CoordinationStore> ExecutorDispatch<S> {
    #[must_use]
    pub fn new(store: Arc<S>, exec_root: impl Into<String>) -> Self {
        Self { store, exec_root: exec_root.into() }
    }

    /// `submit(request, params)`: writes the request node and its
    /// parameters blob under the zone's queue.
    pub fn submit(&self, zone: Option<&str>, params: BTreeMap<String, String>, session: SessionId) -> Result<String, DispatchError> {
        let request = BuildRequest {
            zone: zone.map(str::to_string),
            params,
            state: BuildRequestState::Requested,
            cancel_requested: false,
            resume_requested: false,
        };
        let bytes = serde_json::to_vec(&request).expect("BuildRequest always serialises");
        let prefix = format!("{}/build-", zone_path(&self.exec_root, zone));
        let path = self.store.create(&prefix, bytes, CreateMode::PersistentSequential, session)?;
        debug!(path, ?zone, "submitted build request");
        Ok(path)
    }

    pub fn get(&self, request_id: &str) -> Result<BuildRequest, DispatchError> {
        let node = self.store.read(request_id)?.ok_or_else(|| DispatchError::NotFound(request_id.to_string()))?;
        Ok(serde_json::from_slice(&node.data)?)
    }

    /// An executor locks `request_id` to claim it; losing the race
    /// returns [`CoordError::LockHeld`], surfaced unchanged so the
    /// executor can try the next request in its zone queue.
    pub fn claim(&self, request_id: &str, session: SessionId) -> Result<LockHandle, DispatchError> {
        Ok(self.store.try_lock(&format!("{request_id}/lock"), session)?)
    }

    fn update<F>(&self, request_id: &str, mutate: F) -> Result<(), DispatchError>
    where
        F: FnOnce(&mut BuildRequest),
    {
        let node = self.store.read(request_id)?.ok_or_else(|| DispatchError::NotFound(request_id.to_string()))?;
        let mut request: BuildRequest = serde_json::from_slice(&node.data)?;
        mutate(&mut request);
        let bytes = serde_json::to_vec(&request).expect("BuildRequest always serialises");
        self.store.cas_write(request_id, bytes, Some(node.version))?;
        Ok(())
    }

    pub fn set_state(&self, request_id: &str, state: BuildRequestState) -> Result<(), DispatchError> {
        self.update(request_id, |r| r.state = state)
    }

    /// `requestCancel`: an advisory flag the executor observes and
    /// acts on at its own pace, not a forced stop.
    pub fn request_cancel(&self, request_id: &str) -> Result<(), DispatchError> {
        self.update(request_id, |r| r.cancel_requested = true)
    }

    pub fn request_resume(&self, request_id: &str) -> Result<(), DispatchError> {
        self.update(request_id, |r| r.resume_requested = true)
    }

    /// Deletes the request node. Only valid once the scheduler has
    /// acked a terminal result.
    pub fn ack_result(&self, request_id: &str) -> Result<(), DispatchError> {
        self.store.delete(request_id, None)?;
        Ok(())
    }

    /// `lostRequests()`: requests in `Running`/`Paused` whose claim
    /// lock has no children — the executor that held it vanished
    /// without transitioning to `Completed`.
    pub fn lost_requests(&self, zone: Option<&str>) -> Result<Vec<String>, DispatchError> {
        let queue_path = zone_path(&self.exec_root, zone);
        let mut lost = Vec::new();
        for child in self.store.children(&queue_path)? {
            let request_id = format!("{queue_path}/{child}");
            let request = match self.get(&request_id) {
                Ok(request) => request,
                Err(DispatchError::NotFound(_)) => continue,
                Err(other) => return Err(other),
            };
            if !matches!(request.state, BuildRequestState::Running | BuildRequestState::Paused) {
                continue;
            }
            let holds_lock = match self.store.children(&format!("{request_id}/lock")) {
                Ok(children) => !children.is_empty(),
                Err(CoordError::NoNode { .. }) => false,
                Err(other) => return Err(other.into()),
            };
            if !holds_lock {
                lost.push(request_id);
            }
        }
        Ok(lost)
    }
}
