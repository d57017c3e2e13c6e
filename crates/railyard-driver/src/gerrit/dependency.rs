use std::collections::{BTreeSet, HashSet};

use railyard_coord::{retry_blocking, DEFAULT_BACKOFF};
use railyard_types::{ChangeId, ChangeKey, ReviewChange};

use super::client::{GerritChangeData, GerritClient};
use crate::error::DriverError;

/// Safe ceiling on recursive dependency resolution (open question
/// decision in the grounding ledger: default 200, matching the
/// upstream's own configurable default rather than leaving it
/// unbounded).
pub const DEFAULT_MAX_DEPENDENCIES: usize = 200;

/// `refresh(change, history=∅)`: recursively resolves a
/// change's git-depends, commit-depends, needed-by, and
/// submitted-together sets, folding the latter into *both* the needs
/// and needed-by sets so a bundle is later treated as a scheduling
/// cycle.
///
/// `history` is keyed by `(project, number, patchset)` rather than the
/// full [`ChangeKey`] so a change visited at one patchset short-circuits
/// recursion into it again at the same patchset (cycle-safety, step 1).
pub fn refresh(
    client: &dyn GerritClient,
    connection: &str,
    project: &str,
    number: &str,
    patchset: Option<u32>,
    history: &mut HashSet<(String, String, Option<u32>)>,
    max_dependencies: usize,
) -> Result<ReviewChange, DriverError> {
    let visit_key = (project.to_string(), number.to_string(), patchset);
    if history.len() > max_dependencies {
        let key = ChangeKey::review(connection, project, number, patchset.unwrap_or(0));
        return Err(DriverError::TooManyDependencies(key));
    }
    history.insert(visit_key);

    let data = retry_blocking(&DEFAULT_BACKOFF, || client.query_change(number, patchset))?;
    let key = ChangeKey::review(connection, &data.project, &data.number, data.patchset);

    let mut git_needs = BTreeSet::new();
    let mut compat_needs = BTreeSet::new();
    let mut git_needed_by = BTreeSet::new();
    let mut compat_needed_by = BTreeSet::new();

    if data.merge_state.is_open() {
        if let Some((parent_number, parent_patchset)) = &data.git_parent_dependency {
            if !history.contains(&(project.to_string(), parent_number.clone(), Some(*parent_patchset))) {
                let _ = refresh(client, connection, project, parent_number, Some(*parent_patchset), history, max_dependencies)?;
            }
            git_needs.insert(change_id_for(client, parent_number, Some(*parent_patchset))?);
        }

        for (dep_number, dep_patchset) in retry_blocking(&DEFAULT_BACKOFF, || client.query_change_by_change_id(&data.change_id))? {
            if dep_number == data.number {
                continue;
            }
            if !history.contains(&(project.to_string(), dep_number.clone(), Some(dep_patchset))) {
                let _ = refresh(client, connection, project, &dep_number, Some(dep_patchset), history, max_dependencies)?;
            }
            compat_needs.insert(change_id_for(client, &dep_number, Some(dep_patchset))?);
        }

        for (dep_number, dep_patchset) in retry_blocking(&DEFAULT_BACKOFF, || client.query_needed_by(&data.change_id))? {
            if !history.contains(&(project.to_string(), dep_number.clone(), Some(dep_patchset))) {
                let _ = refresh(client, connection, project, &dep_number, Some(dep_patchset), history, max_dependencies)?;
            }
            compat_needed_by.insert(change_id_for(client, &dep_number, Some(dep_patchset))?);
        }

        for (together_number, together_patchset) in retry_blocking(&DEFAULT_BACKOFF, || client.query_submitted_together(&data.number))? {
            if together_number == data.number {
                continue;
            }
            if !history.contains(&(project.to_string(), together_number.clone(), Some(together_patchset))) {
                let _ = refresh(client, connection, project, &together_number, Some(together_patchset), history, max_dependencies)?;
            }
            let id = change_id_for(client, &together_number, Some(together_patchset))?;
            git_needs.insert(id.clone());
            git_needed_by.insert(id);
        }
    }

    Ok(ReviewChange {
        key,
        branch: data.branch,
        commit_message: data.commit_message,
        merge_state: data.merge_state,
        wip: data.wip,
        is_current_patchset: data.is_current_patchset,
        approvals: data.approvals,
        submit_requirements: data.submit_requirements,
        missing_labels: data.missing_labels,
        content_hash: data.content_hash,
        git_needs,
        compat_needs,
        git_needed_by,
        compat_needed_by,
        change_id: ChangeId(data.change_id),
    })
}

fn change_id_for(client: &dyn GerritClient, number: &str, patchset: Option<u32>) -> Result<ChangeId, DriverError> {
    let data: GerritChangeData = retry_blocking(&DEFAULT_BACKOFF, || client.query_change(number, patchset))?;
    Ok(ChangeId(data.change_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use railyard_types::MergeState;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// A scripted client: each entry is keyed by change number and
    /// returns canned dependency edges, modeling a small review graph
    /// without any real network boundary.
    #[derive(Default)]
    struct FakeClient {
        changes: HashMap<String, GerritChangeData>,
        needed_by: HashMap<String, Vec<(String, u32)>>,
        depends_on_by_change_id: HashMap<String, Vec<(String, u32)>>,
        submitted_together: HashMap<String, Vec<(String, u32)>>,
        queries: RefCell<usize>,
    }

    impl FakeClient {
        fn change(number: &str, change_id: &str, state: MergeState) -> GerritChangeData {
            GerritChangeData {
                project: "p1".into(),
                branch: "main".into(),
                number: number.into(),
                patchset: 1,
                is_current_patchset: true,
                change_id: change_id.into(),
                commit_message: String::new(),
                merge_state: state,
                wip: false,
                approvals: Vec::new(),
                submit_requirements: Vec::new(),
                missing_labels: BTreeSet::new(),
                content_hash: format!("hash-{number}"),
                git_parent_dependency: None,
            }
        }
    }

    impl GerritClient for FakeClient {
        fn query_change(&self, number: &str, _patchset: Option<u32>) -> Result<GerritChangeData, DriverError> {
            *self.queries.borrow_mut() += 1;
            self.changes
                .get(number)
                .cloned()
                .ok_or_else(|| DriverError::BadRequest { key: ChangeKey::review("gerrit", "p1", number, 1), message: "unknown change".into() })
        }

        fn query_change_by_change_id(&self, change_id: &str) -> Result<Vec<(String, u32)>, DriverError> {
            Ok(self.depends_on_by_change_id.get(change_id).cloned().unwrap_or_default())
        }

        fn query_needed_by(&self, change_id: &str) -> Result<Vec<(String, u32)>, DriverError> {
            Ok(self.needed_by.get(change_id).cloned().unwrap_or_default())
        }

        fn query_submitted_together(&self, number: &str) -> Result<Vec<(String, u32)>, DriverError> {
            Ok(self.submitted_together.get(number).cloned().unwrap_or_default())
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
            Ok(Vec::new())
        }
    }

    #[test]
    fn commit_depends_recurses_and_populates_compat_needs() {
        let mut client = FakeClient::default();
        client.changes.insert("100".into(), FakeClient::change("100", "I100", MergeState::Open));
        client.changes.insert("200".into(), FakeClient::change("200", "I200", MergeState::Open));
        client.depends_on_by_change_id.insert("I100".into(), vec![("200".into(), 1)]);

        let mut history = HashSet::new();
        let change = refresh(&client, "gerrit", "p1", "100", Some(1), &mut history, DEFAULT_MAX_DEPENDENCIES).unwrap();
        assert_eq!(change.compat_needs, BTreeSet::from([ChangeId("I200".into())]));
    }

    #[test]
    fn submitted_together_folds_into_both_needs_and_needed_by() {
        let mut client = FakeClient::default();
        client.changes.insert("100".into(), FakeClient::change("100", "I100", MergeState::Open));
        client.changes.insert("300".into(), FakeClient::change("300", "I300", MergeState::Open));
        client.submitted_together.insert("100".into(), vec![("300".into(), 1)]);

        let mut history = HashSet::new();
        let change = refresh(&client, "gerrit", "p1", "100", Some(1), &mut history, DEFAULT_MAX_DEPENDENCIES).unwrap();
        let id = ChangeId("I300".into());
        assert!(change.git_needs.contains(&id));
        assert!(change.git_needed_by.contains(&id));
    }

    #[test]
    fn cycle_between_two_changes_terminates() {
        let mut client = FakeClient::default();
        client.changes.insert("100".into(), FakeClient::change("100", "I100", MergeState::Open));
        client.changes.insert("200".into(), FakeClient::change("200", "I200", MergeState::Open));
        client.depends_on_by_change_id.insert("I100".into(), vec![("200".into(), 1)]);
        client.depends_on_by_change_id.insert("I200".into(), vec![("100".into(), 1)]);

        let mut history = HashSet::new();
        let change = refresh(&client, "gerrit", "p1", "100", Some(1), &mut history, DEFAULT_MAX_DEPENDENCIES).unwrap();
        assert_eq!(change.compat_needs, BTreeSet::from([ChangeId("I200".into())]));
    }

    #[test]
    fn merged_change_skips_dependency_resolution() {
        let mut client = FakeClient::default();
        client.changes.insert("100".into(), FakeClient::change("100", "I100", MergeState::Merged));
        client.depends_on_by_change_id.insert("I100".into(), vec![("200".into(), 1)]);

        let mut history = HashSet::new();
        let change = refresh(&client, "gerrit", "p1", "100", Some(1), &mut history, DEFAULT_MAX_DEPENDENCIES).unwrap();
        assert!(change.compat_needs.is_empty());
    }

    #[test]
    fn exceeding_max_dependencies_fails() {
        let client = FakeClient::default();
        let mut history: HashSet<(String, String, Option<u32>)> = (0..=DEFAULT_MAX_DEPENDENCIES)
            .map(|n| ("p1".to_string(), n.to_string(), Some(1)))
            .collect();
        let err = refresh(&client, "gerrit", "p1", "999999", Some(1), &mut history, DEFAULT_MAX_DEPENDENCIES).unwrap_err();
        assert!(matches!(err, DriverError::TooManyDependencies(_)));
    }
}
