use std::collections::BTreeSet;

use railyard_types::{Approval, MergeState, SubmitRequirement};

/// The raw shape of one Gerrit query result, as the HTTP/SSH boundary
/// (out of scope to implement for real) would hand back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GerritChangeData {
    pub project: String,
    pub branch: String,
    pub number: String,
    pub patchset: u32,
    pub is_current_patchset: bool,
    pub change_id: String,
    pub commit_message: String,
    pub merge_state: MergeState,
    pub wip: bool,
    pub approvals: Vec<Approval>,
    pub submit_requirements: Vec<SubmitRequirement>,
    pub missing_labels: BTreeSet<String>,
    pub content_hash: String,
    /// The parent-commit dependency, if the immediate git parent of
    /// this patchset is itself an open change.
    pub git_parent_dependency: Option<(String, u32)>,
}

/// The network boundary a Gerrit connection needs. `railyard-driver` ships no
/// implementation of this trait; callers supply one (SSH/HTTP client)
/// or, for tests, a scripted fake (see `tests` module in
/// `gerrit::driver`).
pub trait GerritClient: Send + Sync {
    fn query_change(&self, number: &str, patchset: Option<u32>) -> Result<GerritChangeData, crate::DriverError>;

    /// Changes matching a `Depends-On: <id>` trailer's target — i.e.
    /// this change's own cross-repo needs discovered by searching the
    /// commit message (`_getDependsOnFromCommit`).
    fn query_change_by_change_id(&self, change_id: &str) -> Result<Vec<(String, u32)>, crate::DriverError>;

    /// Reverse of the above: changes whose commit message names
    /// `change_id` in a `Depends-On:` trailer (`_getNeededByFromCommit`).
    fn query_needed_by(&self, change_id: &str) -> Result<Vec<(String, u32)>, crate::DriverError>;

    /// The upstream's own atomic-submit grouping (`_getSubmittedTogether`).
    fn query_submitted_together(&self, number: &str) -> Result<Vec<(String, u32)>, crate::DriverError>;

    fn get_ref_sha(&self, project: &str, ref_name: &str) -> Result<String, crate::DriverError>;

    fn post_review(&self, number: &str, patchset: u32, message: &str) -> Result<(), crate::DriverError>;

    fn submit(&self, number: &str, patchset: u32) -> Result<(), crate::DriverError>;

    fn project_open_changes(&self, project: &str) -> Result<Vec<String>, crate::DriverError>;
}
