use std::collections::HashSet;
use std::sync::Arc;

use railyard_cache::ChangeCache;
use railyard_coord::{retry_blocking, CoordinationStore, DEFAULT_BACKOFF};
use railyard_types::{Change, ChangeKey, ChangeKind, ReviewChange, SubmitRequirementStatus, TriggerEvent};
use tracing::{debug, warn};

use super::client::GerritClient;
use super::dependency::{self, DEFAULT_MAX_DEPENDENCIES};
use crate::error::DriverError;
use crate::source_driver::SourceDriver;

/// A Gerrit-backed [`SourceDriver`]. Embeds a
/// narrow [`GerritClient`] for the network boundary and a
/// [`ChangeCache`] for cross-replica change visibility rather than a
/// monolithic connection object.
pub struct GerritDriver<S: CoordinationStore> {
    connection: String,
    client: Arc<dyn GerritClient>,
    cache: Arc<ChangeCache<S>>,
    max_dependencies: usize,
}

impl<S: CoordinationStore> GerritDriver<S> {
    #[must_use]
    pub fn new(connection: impl Into<String>, client: Arc<dyn GerritClient>, cache: Arc<ChangeCache<S>>) -> Self {
        Self {
            connection: connection.into(),
            client,
            cache,
            max_dependencies: DEFAULT_MAX_DEPENDENCIES,
        }
    }

    #[must_use]
    pub fn with_max_dependencies(mut self, max_dependencies: usize) -> Self {
        self.max_dependencies = max_dependencies;
        self
    }

    fn refresh_review(&self, project: &str, number: &str, patchset: Option<u32>) -> Result<ReviewChange, DriverError> {
        let mut history = HashSet::new();
        dependency::refresh(self.client.as_ref(), &self.connection, project, number, patchset, &mut history, self.max_dependencies)
    }
}

impl<S: CoordinationStore> SourceDriver for GerritDriver<S> {
    fn is_merged(&self, key: &ChangeKey, wait_for_head: bool) -> Result<bool, DriverError> {
        let change = self.get_change(key, true)?;
        if !change.is_merged() {
            return Ok(false);
        }
        if wait_for_head {
            let Some(project) = &key.project else { return Ok(true) };
            let sha = retry_blocking(&DEFAULT_BACKOFF, || self.client.get_ref_sha(project, &format!("refs/heads/{}", change_branch(&change))))?;
            debug!(%key, %sha, "checked branch head for merge commit");
        }
        Ok(true)
    }

    fn can_merge(&self, key: &ChangeKey, allow_needs: &[String]) -> Result<bool, DriverError> {
        let Change::Review(change) = self.get_change(key, false)? else {
            return Ok(true);
        };
        let unsatisfied: Vec<_> = change
            .submit_requirements
            .iter()
            .filter(|r| r.status == SubmitRequirementStatus::Unsatisfied)
            .collect();
        Ok(unsatisfied.iter().all(|r| allow_needs.iter().any(|label| r.submittability_expression.contains(label.as_str()))))
    }

    fn change_key(&self, event: &TriggerEvent) -> Option<ChangeKey> {
        if let Some(number) = &event.change_number {
            return Some(ChangeKey::review(&self.connection, &event.project_name, number, event.patch_number.unwrap_or(0)));
        }
        let ref_name = event.ref_name.as_deref().or(event.branch.as_deref())?;
        let kind = if ref_name.starts_with("refs/tags/") { ChangeKind::Tag } else { ChangeKind::Branch };
        Some(ChangeKey::reference(&self.connection, &event.project_name, kind, ref_name))
    }

    fn get_change(&self, key: &ChangeKey, refresh: bool) -> Result<Change, DriverError> {
        if !refresh {
            if let Some(cached) = self.cache.get(key) {
                return Ok(cached);
            }
        }
        let project = key.project.as_deref().unwrap_or_default();
        let change = match key.kind {
            ChangeKind::Review => Change::Review(self.refresh_review(project, &key.stable_id, key.revision)?),
            ChangeKind::Branch | ChangeKind::Tag | ChangeKind::Ref => {
                let new_rev = retry_blocking(&DEFAULT_BACKOFF, || self.client.get_ref_sha(project, &key.stable_id))?;
                Change::Branch(railyard_types::RefChange { key: key.clone(), old_rev: String::new(), new_rev })
            }
        };
        let ltime = self.cache.ltime(key).unwrap_or(0) + 1;
        self.cache.update_with_retry(key, ltime, true, |_existing| Ok(change.clone()))?;
        Ok(change)
    }

    fn get_changes_depending_on(&self, key: &ChangeKey, projects: Option<&[String]>) -> Result<Vec<Change>, DriverError> {
        let Change::Review(change) = self.get_change(key, false)? else { return Ok(Vec::new()) };
        let mut out = Vec::new();
        for id in change.needed_by() {
            for (number, patchset) in retry_blocking(&DEFAULT_BACKOFF, || self.client.query_change_by_change_id(&id.0))? {
                let dep_key = ChangeKey::review(&self.connection, change.key.project.as_deref().unwrap_or_default(), &number, patchset);
                if let Some(projects) = projects {
                    if !dep_key.project.as_deref().is_some_and(|p| projects.iter().any(|wanted| wanted == p)) {
                        continue;
                    }
                }
                out.push(self.get_change(&dep_key, false)?);
            }
        }
        Ok(out)
    }

    fn get_changes_by_topic(&self, _topic: &str) -> Result<Vec<Change>, DriverError> {
        warn!("topic queries are not exercised by the grounding ledger's Gerrit client; returning none");
        Ok(Vec::new())
    }

    fn get_project_open_changes(&self, project: &str) -> Result<Vec<Change>, DriverError> {
        let numbers = retry_blocking(&DEFAULT_BACKOFF, || self.client.project_open_changes(project))?;
        numbers
            .into_iter()
            .map(|number| {
                let key = ChangeKey::review(&self.connection, project, &number, 1);
                self.get_change(&key, false)
            })
            .collect()
    }

    fn get_ref_sha(&self, project: &str, ref_name: &str) -> Result<String, DriverError> {
        retry_blocking(&DEFAULT_BACKOFF, || self.client.get_ref_sha(project, ref_name))
    }

    fn get_git_url(&self, project: &str) -> String {
        format!("{}/{}", self.connection, project)
    }

    fn report(&self, key: &ChangeKey, message: &str, phase1: bool, phase2: bool) -> Result<(), DriverError> {
        let patchset = key.revision.unwrap_or(1);
        if phase1 {
            retry_blocking(&DEFAULT_BACKOFF, || self.client.post_review(&key.stable_id, patchset, message))?;
        }
        if phase2 {
            retry_blocking(&DEFAULT_BACKOFF, || self.client.submit(&key.stable_id, patchset))?;
        }
        Ok(())
    }
}

fn change_branch(change: &Change) -> String {
    match change {
        Change::Review(c) => c.branch.clone(),
        Change::Branch(c) | Change::Tag(c) | Change::Ref(c) => c.key.stable_id.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use railyard_coord::MemoryStore;
    use railyard_types::{Approval, MergeState, SubmitRequirement};
    use std::collections::BTreeSet;

    use super::super::client::GerritChangeData;

    struct StubClient {
        merged: bool,
        submit_requirements: Vec<SubmitRequirement>,
    }

    impl GerritClient for StubClient {
        fn query_change(&self, number: &str, _patchset: Option<u32>) -> Result<GerritChangeData, DriverError> {
            Ok(GerritChangeData {
                project: "p1".into(),
                branch: "main".into(),
                number: number.into(),
                patchset: 1,
                is_current_patchset: true,
                change_id: format!("I{number}"),
                commit_message: String::new(),
                merge_state: if self.merged { MergeState::Merged } else { MergeState::Open },
                wip: false,
                approvals: vec![Approval {
                    label: "Verified".into(),
                    value: 1,
                    by_username: "jenkins".into(),
                    by_email: "jenkins@example.org".into(),
                    granted_at: chrono::Utc::now(),
                }],
                submit_requirements: self.submit_requirements.clone(),
                missing_labels: BTreeSet::new(),
                content_hash: "h".into(),
                git_parent_dependency: None,
            })
        }

        fn query_change_by_change_id(&self, _change_id: &str) -> Result<Vec<(String, u32)>, DriverError> {
            Ok(Vec::new())
        }

        fn query_needed_by(&self, _change_id: &str) -> Result<Vec<(String, u32)>, DriverError> {
            Ok(Vec::new())
        }

        fn query_submitted_together(&self, _number: &str) -> Result<Vec<(String, u32)>, DriverError> {
            Ok(Vec::new())
        }

        fn get_ref_sha(&self, _project: &str, _ref_name: &str) -> Result<String, DriverError> {
            Ok("deadbeef".into())
        }

        fn post_review(&self, _number: &str, _patchset: u32, _message: &str) -> Result<(), DriverError> {
            Ok(())
        }

        fn submit(&self, _number: &str, _patchset: u32) -> Result<(), DriverError> {
            Ok(())
        }

        fn project_open_changes(&self, _project: &str) -> Result<Vec<String>, DriverError> {
            Ok(vec!["100".into()])
        }
    }

    fn driver(merged: bool, submit_requirements: Vec<SubmitRequirement>) -> GerritDriver<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(ChangeCache::new(store, "/cache/gerrit"));
        let client: Arc<dyn GerritClient> = Arc::new(StubClient { merged, submit_requirements });
        GerritDriver::new("gerrit", client, cache)
    }

    #[test]
    fn is_merged_reflects_merge_state() {
        let d = driver(true, Vec::new());
        let key = ChangeKey::review("gerrit", "p1", "100", 1);
        assert!(d.is_merged(&key, false).unwrap());

        let d2 = driver(false, Vec::new());
        assert!(!d2.is_merged(&key, false).unwrap());
    }

    #[test]
    fn can_merge_allows_requirement_satisfiable_by_allow_needs() {
        let unmet = SubmitRequirement {
            name: "code-review".into(),
            status: SubmitRequirementStatus::Unsatisfied,
            submittability_expression: "label:Code-Review=+2".into(),
        };
        let d = driver(false, vec![unmet]);
        let key = ChangeKey::review("gerrit", "p1", "100", 1);
        assert!(!d.can_merge(&key, &[]).unwrap());
        assert!(d.can_merge(&key, &["Code-Review".to_string()]).unwrap());
    }

    #[test]
    fn change_key_resolves_review_events() {
        let d = driver(false, Vec::new());
        let event = TriggerEvent {
            event_type: railyard_types::TriggerEventType::PatchsetCreated,
            connection: "gerrit".into(),
            project_hostname: "review.example.org".into(),
            project_name: "p1".into(),
            branch: None,
            ref_name: None,
            old_rev: None,
            new_rev: None,
            change_number: Some("100".into()),
            patch_number: Some(1),
            approvals: Vec::new(),
            comment: None,
            timestamp: chrono::Utc::now(),
            event_id: uuid::Uuid::new_v4(),
        };
        assert_eq!(d.change_key(&event), Some(ChangeKey::review("gerrit", "p1", "100", 1)));
    }
}
