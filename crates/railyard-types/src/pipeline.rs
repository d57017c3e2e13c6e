use serde::{Deserialize, Serialize};

/// The scheduling discipline a pipeline's change queue follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManagerKind {
    /// Items run independently; no cross-item speculation.
    Independent,
    /// Gated/dependent: items run speculatively assuming predecessors
    /// merge; a predecessor failure resets later items.
    Dependent,
    /// Like `Dependent` but with window fixed at 1 (strict FIFO).
    Serial,
    /// A new trigger for a live change's identity cancels the older
    /// item.
    Supercedent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Precedence {
    High,
    Normal,
    Low,
}

impl Default for Precedence {
    fn default() -> Self {
        Precedence::Normal
    }
}

/// AIMD-style concurrency window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub current: u32,
    pub floor: u32,
    pub ceiling: u32,
}

impl Window {
    #[must_use]
    pub fn new(initial: u32, floor: u32, ceiling: u32) -> Self {
        debug_assert!(floor >= 1, "window floor must be at least 1");
        debug_assert!(ceiling >= floor, "window ceiling must not be below its floor");
        Self {
            current: initial.clamp(floor, ceiling),
            floor,
            ceiling,
        }
    }

    /// Additive increase on head success: grow by one, capped at
    /// `ceiling`.
    pub fn grow(&mut self) {
        self.current = (self.current + 1).min(self.ceiling);
    }

    /// Multiplicative decrease on failure: halve, floored at `floor`.
    pub fn shrink(&mut self) {
        self.current = (self.current / 2).max(self.floor);
    }
}

/// One typed predicate set an event must satisfy to enqueue a change
///.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSpec {
    pub event_type: String,
    #[serde(default)]
    pub ref_regex: Option<String>,
    #[serde(default)]
    pub approval_label: Option<String>,
    #[serde(default)]
    pub approval_value: Option<i32>,
    #[serde(default)]
    pub approval_username: Option<String>,
    #[serde(default)]
    pub approval_newer_than: Option<chrono::Duration>,
    #[serde(default)]
    pub approval_older_than: Option<chrono::Duration>,
}

/// A conjunctive pipeline-level predicate evaluated on the change itself
/// (open, current-patchset, approvals, reject-approvals, wip, ...).
/// Non-live dependency changes must also satisfy this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementSpec {
    pub require_open: bool,
    pub require_current_patchset: bool,
    pub require_approval_label: Option<String>,
    pub require_approval_min_value: Option<i32>,
    pub reject_approval_label: Option<String>,
}

impl Default for RequirementSpec {
    fn default() -> Self {
        Self {
            require_open: true,
            require_current_patchset: true,
            require_approval_label: None,
            require_approval_min_value: None,
            reject_approval_label: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReporterRef {
    pub name: String,
    pub kind: String,
}

/// A named processing policy: what enqueues (`triggers`), what gates
/// enqueue (`requirements`), how items interact (`manager_kind`), and how
/// results are surfaced (`reporters`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    pub name: String,
    pub manager_kind: ManagerKind,
    pub triggers: Vec<TriggerSpec>,
    pub requirements: RequirementSpec,
    pub reporters: Vec<ReporterRef>,
    pub window: Window,
    pub precedence: Precedence,
    pub max_dependencies: u32,
}

impl Pipeline {
    /// Default ceiling on a change's resolved dependency count when
    /// unset by configuration.
    pub const DEFAULT_MAX_DEPENDENCIES: u32 = 200;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_grows_additively_and_clamps_to_ceiling() {
        let mut w = Window::new(1, 1, 3);
        w.grow();
        assert_eq!(w.current, 2);
        w.grow();
        assert_eq!(w.current, 3);
        w.grow();
        assert_eq!(w.current, 3, "growth must not exceed ceiling");
    }

    #[test]
    fn window_shrinks_multiplicatively_and_floors() {
        let mut w = Window::new(8, 2, 20);
        w.shrink();
        assert_eq!(w.current, 4);
        w.shrink();
        assert_eq!(w.current, 2);
        w.shrink();
        assert_eq!(w.current, 2, "shrink must not go below floor");
    }
}
