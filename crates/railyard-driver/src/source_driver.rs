use railyard_types::{Change, ChangeKey, TriggerEvent};

use crate::error::DriverError;

/// Operations any source connection must provide. Expressed as a
/// trait so a second driver (e.g. GitLab) can be added without
/// touching the pipeline manager; only the Gerrit implementation is
/// built out here.
pub trait SourceDriver: Send + Sync {
    /// Whether `change` is merged. `head`, when set, additionally waits
    /// for the merge commit to appear at the branch head.
    fn is_merged(&self, key: &ChangeKey, wait_for_head: bool) -> Result<bool, DriverError>;

    /// Whether `change` can be merged given `allow_needs` — submit
    /// requirements this caller could itself still satisfy (e.g. by
    /// voting). Enforces the `missing_labels` vs. `unsatisfied`
    /// distinction on the change's submit requirements.
    fn can_merge(&self, key: &ChangeKey, allow_needs: &[String]) -> Result<bool, DriverError>;

    /// Resolves an internal [`TriggerEvent`] to the [`ChangeKey`] it
    /// addresses.
    fn change_key(&self, event: &TriggerEvent) -> Option<ChangeKey>;

    /// Fetches (optionally refreshing) a change plus its dependency
    /// graph.
    fn get_change(&self, key: &ChangeKey, refresh: bool) -> Result<Change, DriverError>;

    /// Reverse dependency query: changes whose `Depends-On`/parent-commit
    /// points at `key`.
    fn get_changes_depending_on(&self, key: &ChangeKey, projects: Option<&[String]>) -> Result<Vec<Change>, DriverError>;

    /// All changes sharing `topic` (a review-system grouping concept
    /// independent of cross-repo dependencies).
    fn get_changes_by_topic(&self, topic: &str) -> Result<Vec<Change>, DriverError>;

    fn get_project_open_changes(&self, project: &str) -> Result<Vec<Change>, DriverError>;

    fn get_ref_sha(&self, project: &str, ref_name: &str) -> Result<String, DriverError>;

    fn get_git_url(&self, project: &str) -> String;

    /// Reports on an item: `phase1` posts message/votes, `phase2`
    /// optionally performs the upstream submit/merge. A `phase2`
    /// failure must not re-run `phase1`.
    fn report(&self, key: &ChangeKey, message: &str, phase1: bool, phase2: bool) -> Result<(), DriverError>;
}
