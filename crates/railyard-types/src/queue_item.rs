use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::buildset::BuildSet;
use crate::change::ChangeKey;

/// Lifecycle of a [`QueueItem`]: created on enqueue, mutated only by the
/// replica currently holding the pipeline lock, destroyed after a
/// terminal report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemStatus {
    New,
    PendingNode,
    Running,
    Reporting,
    Completed,
    Dequeued,
}

/// One occupied slot in a pipeline's change-queue.
///
/// `live_changes` is a set rather than a single key because a cycle
/// bundle (cross-repo `Depends-On:` pair, or an upstream
/// submitted-together group) is scheduled, run, and reported as one
/// atomic unit (invariant I4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Stable across re-freezes and position shifts; lets a result
    /// event (which may arrive after the item has moved within the
    /// queue) still find the right item.
    pub id: Uuid,
    pub live_changes: Vec<ChangeKey>,
    pub build_set: BuildSet,
    pub status: ItemStatus,
    pub enqueued_at: chrono::DateTime<chrono::Utc>,
    pub reported_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Position pointers within the owning `ChangeQueue`, by index into
    /// its item list; `None` for head/tail respectively.
    pub previous: Option<usize>,
    pub current: usize,
}

impl QueueItem {
    #[must_use]
    pub fn new(live_changes: Vec<ChangeKey>, position: usize, now: chrono::DateTime<chrono::Utc>) -> Self {
        debug_assert!(!live_changes.is_empty(), "a queue item must represent at least one change");
        Self {
            id: Uuid::new_v4(),
            live_changes,
            build_set: BuildSet::empty(),
            status: ItemStatus::New,
            enqueued_at: now,
            reported_at: None,
            previous: position.checked_sub(1),
            current: position,
        }
    }

    #[must_use]
    pub fn is_bundle(&self) -> bool {
        self.live_changes.len() > 1
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, ItemStatus::Completed | ItemStatus::Dequeued)
    }

    /// Identity used for supercedence: the identity of any one of
    /// its live changes is enough because a supercedent pipeline never
    /// enqueues bundles.
    #[must_use]
    pub fn supercedence_identity(&self) -> Option<(String, Option<String>, crate::change::ChangeKind, String)> {
        self.live_changes.first().map(ChangeKey::identity)
    }
}
