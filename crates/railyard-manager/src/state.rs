use std::sync::Arc;

use railyard_coord::CoordinationStore;
use railyard_types::{QueueItem, Window};
use serde::{Deserialize, Serialize};

use crate::error::ManagerError;

/// A pipeline's entire durable state: its change-queue and its current
/// AIMD window. Persisted as one CAS-versioned blob rather than a
/// per-item child-node tree — a deliberate simplification recorded in
/// DESIGN.md, since a single blob still gives every replica a
/// consistent lock-free read and the CAS write under the pipeline
/// lock is never contended by more than the current leader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    pub window: Window,
    pub queue: Vec<QueueItem>,
}

impl PipelineState {
    #[must_use]
    pub fn fresh(window: Window) -> Self {
        Self { window, queue: Vec::new() }
    }
}

/// Reads and writes a pipeline's [`PipelineState`] at a single CS path.
/// Reads are lock-free; writes go through CAS and are only ever issued
/// by whichever replica currently holds the pipeline lock.
pub struct PipelineStateStore<S: CoordinationStore> {
    store: Arc<S>,
    path: String,
}

impl<S: CoordinationStore> PipelineStateStore<S> {
    #[must_use]
    pub fn new(store: Arc<S>, path: impl Into<String>) -> Self {
        Self { store, path: path.into() }
    }

    pub fn read(&self) -> Result<Option<PipelineState>, ManagerError> {
        let Some(node) = self.store.read(&self.path)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&node.data)?))
    }

    pub fn write(&self, state: &PipelineState) -> Result<(), ManagerError> {
        let bytes = serde_json::to_vec(state).expect("PipelineState always serialises");
        let existing_version = self.store.read(&self.path)?.map(|node| node.version);
        self.store.cas_write(&self.path, bytes, existing_version)?;
        Ok(())
    }
}
