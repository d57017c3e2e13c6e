use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Terminal and non-terminal states of one job within a [`BuildSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOutcome {
    Waiting,
    NodeRequested,
    Starting,
    Running,
    Paused,
    Completed,
    Cancelled,
    Failed,
    Aborted,
    Skipped,
}

impl JobOutcome {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobOutcome::Completed
                | JobOutcome::Cancelled
                | JobOutcome::Failed
                | JobOutcome::Aborted
                | JobOutcome::Skipped
        )
    }

    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, JobOutcome::Completed | JobOutcome::Skipped)
    }
}

/// One job frozen into a [`BuildSet`]: its nodeset requirement, its
/// variables, and its dependency edges on sibling jobs (for artifact and
/// child-variable propagation once a prerequisite completes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    pub nodeset: Vec<String>,
    pub variables: BTreeMap<String, String>,
    pub depends_on: Vec<String>,
    pub executor_zone: Option<String>,
    pub outcome: JobOutcome,
    pub node_request_id: Option<String>,
    pub build_id: Option<String>,
}

impl Job {
    #[must_use]
    pub fn new(name: impl Into<String>, nodeset: Vec<String>) -> Self {
        Self {
            name: name.into(),
            nodeset,
            variables: BTreeMap::new(),
            depends_on: Vec::new(),
            executor_zone: None,
            outcome: JobOutcome::Waiting,
            node_request_id: None,
            build_id: None,
        }
    }

    /// A job is runnable once every job it depends on has completed
    /// successfully and it has not already been dispatched.
    #[must_use]
    pub fn prerequisites_met(&self, by_name: &BTreeMap<&str, JobOutcome>) -> bool {
        self.depends_on
            .iter()
            .all(|dep| by_name.get(dep.as_str()).is_some_and(|o| o.is_success()))
    }
}

/// The set of jobs frozen for a `QueueItem` given its speculative
/// position in the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSet {
    pub jobs: Vec<Job>,
    pub frozen: bool,
}

impl BuildSet {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            jobs: Vec::new(),
            frozen: false,
        }
    }

    #[must_use]
    pub fn frozen_with(jobs: Vec<Job>) -> Self {
        Self { jobs, frozen: true }
    }

    #[must_use]
    pub fn all_terminal(&self) -> bool {
        !self.jobs.is_empty() && self.jobs.iter().all(|j| j.outcome.is_terminal())
    }

    #[must_use]
    pub fn all_success(&self) -> bool {
        self.all_terminal() && self.jobs.iter().all(|j| j.outcome.is_success())
    }

    pub fn job_mut(&mut self, name: &str) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.name == name)
    }

    /// Re-freeze against a fresh job list, discarding all prior outcomes.
    /// Used by the speculative-reset path when a predecessor
    /// fails and this item's assumptions are invalidated.
    pub fn reset(&mut self, jobs: Vec<Job>) {
        self.jobs = jobs;
        self.frozen = true;
    }
}
