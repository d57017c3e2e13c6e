use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::change::Approval;

/// The envelope every event carries through an Event Queue,
/// regardless of driver. `span_context` is opaque tracing-propagation
/// bytes; this crate does not interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event<P> {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub event_id: Uuid,
    pub span_context: Vec<u8>,
    pub payload: P,
}

impl<P> Event<P> {
    pub fn new(payload: P, timestamp: chrono::DateTime<chrono::Utc>, event_id: Uuid) -> Self {
        Self {
            timestamp,
            event_id,
            span_context: Vec::new(),
            payload,
        }
    }
}

/// The kind of upstream happening a [`TriggerEvent`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerEventType {
    PatchsetCreated,
    CommentAdded,
    RefUpdated,
    ChangeMerged,
    ChangeAbandoned,
    ChangeRestored,
    Timer,
}

impl TriggerEventType {
    /// The string a [`crate::TriggerSpec::event_type`] regex matches
    /// against.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerEventType::PatchsetCreated => "patchset-created",
            TriggerEventType::CommentAdded => "comment-added",
            TriggerEventType::RefUpdated => "ref-updated",
            TriggerEventType::ChangeMerged => "change-merged",
            TriggerEventType::ChangeAbandoned => "change-abandoned",
            TriggerEventType::ChangeRestored => "change-restored",
            TriggerEventType::Timer => "timer",
        }
    }
}

impl fmt::Display for TriggerEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical internal trigger-event fields, driver-agnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub event_type: TriggerEventType,
    pub connection: String,
    pub project_hostname: String,
    pub project_name: String,
    pub branch: Option<String>,
    pub ref_name: Option<String>,
    pub old_rev: Option<String>,
    pub new_rev: Option<String>,
    pub change_number: Option<String>,
    pub patch_number: Option<u32>,
    pub approvals: Vec<Approval>,
    pub comment: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub event_id: Uuid,
}
