use railyard_types::{ChangeKey, JobOutcome};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A management command aimed at one pipeline: enqueue/dequeue/promote,
/// issued by an operator or by supercedence logic in another pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ManagementEvent {
    Enqueue { live_changes: Vec<ChangeKey> },
    Dequeue { item_id: Uuid },
    Promote { item_id: Uuid },
}

/// A result delivered back from the Node Request Service or Executor
/// Dispatch for a job belonging to `item_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResultEvent {
    NodeFulfilled { item_id: Uuid, job_name: String, request_id: String },
    NodeFailed { item_id: Uuid, job_name: String },
    BuildResult { item_id: Uuid, job_name: String, build_id: Option<String>, outcome: JobOutcome },
}

impl ResultEvent {
    #[must_use]
    pub fn item_id(&self) -> Uuid {
        match self {
            ResultEvent::NodeFulfilled { item_id, .. } | ResultEvent::NodeFailed { item_id, .. } | ResultEvent::BuildResult { item_id, .. } => {
                *item_id
            }
        }
    }
}
