use std::collections::HashMap;
use std::sync::Mutex;

use railyard_driver::{DriverError, GerritChangeData, GerritClient};
use railyard_types::ChangeKey;

/// A scripted [`GerritClient`]: every query answers from a small
/// in-memory table instead of a network boundary. Changes are keyed by number; callers
/// build the table with the `with_*` methods before wiring the client
/// into a [`railyard_driver::GerritDriver`].
///
/// Shares the same scripting shape as `railyard-driver`'s own
/// `gerrit::dependency` test fixture, generalised into a reusable
/// fake so the scenario harness does not have to hand-roll one.
#[derive(Default)]
pub struct ScriptedGerritClient {
    changes: Mutex<HashMap<String, GerritChangeData>>,
    needed_by: Mutex<HashMap<String, Vec<(String, u32)>>>,
    depends_on_by_change_id: Mutex<HashMap<String, Vec<(String, u32)>>>,
    submitted_together: Mutex<HashMap<String, Vec<(String, u32)>>>,
    ref_shas: Mutex<HashMap<(String, String), String>>,
    project_open: Mutex<HashMap<String, Vec<String>>>,
    posted_reviews: Mutex<Vec<(String, u32, String)>>,
    submits: Mutex<Vec<(String, u32)>>,
}

impl ScriptedGerritClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a change's query response, keyed by its number.
    pub fn with_change(&self, data: GerritChangeData) {
        self.changes.lock().unwrap().insert(data.number.clone(), data);
    }

    /// Scripts the `Depends-On:` targets found in `change_id`'s commit
    /// message.
    pub fn with_depends_on(&self, change_id: impl Into<String>, targets: Vec<(String, u32)>) {
        self.depends_on_by_change_id.lock().unwrap().insert(change_id.into(), targets);
    }

    /// Scripts the reverse: changes whose commit message names
    /// `change_id` in a `Depends-On:` trailer.
    pub fn with_needed_by(&self, change_id: impl Into<String>, dependents: Vec<(String, u32)>) {
        self.needed_by.lock().unwrap().insert(change_id.into(), dependents);
    }

    pub fn with_submitted_together(&self, number: impl Into<String>, group: Vec<(String, u32)>) {
        self.submitted_together.lock().unwrap().insert(number.into(), group);
    }

    pub fn with_ref_sha(&self, project: impl Into<String>, ref_name: impl Into<String>, sha: impl Into<String>) {
        self.ref_shas.lock().unwrap().insert((project.into(), ref_name.into()), sha.into());
    }

    pub fn with_project_open_changes(&self, project: impl Into<String>, numbers: Vec<String>) {
        self.project_open.lock().unwrap().insert(project.into(), numbers);
    }

    /// Every `(number, patchset, message)` posted via phase-1 reporting,
    /// in call order.
    #[must_use]
    pub fn posted_reviews(&self) -> Vec<(String, u32, String)> {
        self.posted_reviews.lock().unwrap().clone()
    }

    /// Every `(number, patchset)` submitted via phase-2 reporting, in
    /// call order.
    #[must_use]
    pub fn submits(&self) -> Vec<(String, u32)> {
        self.submits.lock().unwrap().clone()
    }
}

impl GerritClient for ScriptedGerritClient {
    fn query_change(&self, number: &str, _patchset: Option<u32>) -> Result<GerritChangeData, DriverError> {
        self.changes.lock().unwrap().get(number).cloned().ok_or_else(|| DriverError::BadRequest {
            key: ChangeKey::review("gerrit", "", number, 1),
            message: format!("no scripted change {number}"),
        })
    }

    fn query_change_by_change_id(&self, change_id: &str) -> Result<Vec<(String, u32)>, DriverError> {
        Ok(self.depends_on_by_change_id.lock().unwrap().get(change_id).cloned().unwrap_or_default())
    }

    fn query_needed_by(&self, change_id: &str) -> Result<Vec<(String, u32)>, DriverError> {
        Ok(self.needed_by.lock().unwrap().get(change_id).cloned().unwrap_or_default())
    }

    fn query_submitted_together(&self, number: &str) -> Result<Vec<(String, u32)>, DriverError> {
        Ok(self.submitted_together.lock().unwrap().get(number).cloned().unwrap_or_default())
    }

    fn get_ref_sha(&self, project: &str, ref_name: &str) -> Result<String, DriverError> {
        Ok(self
            .ref_shas
            .lock()
            .unwrap()
            .get(&(project.to_string(), ref_name.to_string()))
            .cloned()
            .unwrap_or_else(|| "deadbeef".into()))
    }

    fn post_review(&self, number: &str, patchset: u32, message: &str) -> Result<(), DriverError> {
        self.posted_reviews.lock().unwrap().push((number.to_string(), patchset, message.to_string()));
        Ok(())
    }

    fn submit(&self, number: &str, patchset: u32) -> Result<(), DriverError> {
        self.submits.lock().unwrap().push((number.to_string(), patchset));
        Ok(())
    }

    fn project_open_changes(&self, project: &str) -> Result<Vec<String>, DriverError> {
        Ok(self.project_open.lock().unwrap().get(project).cloned().unwrap_or_default())
    }
}

/// A bare-bones scripted change: open, current patchset, no approvals
/// or dependencies. Scenarios layer on top with the `with_*` builders.
#[must_use]
pub fn scripted_change(number: &str, change_id: &str) -> GerritChangeData {
    GerritChangeData {
        project: "p1".into(),
        branch: "refs/heads/main".into(),
        number: number.into(),
        patchset: 1,
        is_current_patchset: true,
        change_id: change_id.into(),
        commit_message: String::new(),
        merge_state: railyard_types::MergeState::Open,
        wip: false,
        approvals: Vec::new(),
        submit_requirements: Vec::new(),
        missing_labels: std::collections::BTreeSet::new(),
        content_hash: format!("hash-{number}"),
        git_parent_dependency: None,
    }
}
