use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of ref a [`Change`] addresses.
///
/// Mirrors the upstream review system's own distinction between a human
/// review (which carries patchsets and approvals) and a bare ref update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Review,
    Branch,
    Tag,
    Ref,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeKind::Review => "review",
            ChangeKind::Branch => "branch",
            ChangeKind::Tag => "tag",
            ChangeKind::Ref => "ref",
        };
        f.write_str(s)
    }
}

/// The sole addressing primitive exchanged between components.
///
/// Serialises as `<conn>/<project?>/<kind>/<stable-id>/<revision?>`; see
/// the coordination-store layout in the crate root docs of
/// `railyard-coord` for how this maps onto cache paths.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChangeKey {
    pub connection: String,
    pub project: Option<String>,
    pub kind: ChangeKind,
    /// Stable identifier: numeric change number for a review, ref name
    /// otherwise.
    pub stable_id: String,
    /// Patchset number for a review; `None` for branch/tag/ref kinds.
    pub revision: Option<u32>,
}

impl ChangeKey {
    #[must_use]
    pub fn review(connection: &str, project: &str, number: &str, patchset: u32) -> Self {
        Self {
            connection: connection.to_string(),
            project: Some(project.to_string()),
            kind: ChangeKind::Review,
            stable_id: number.to_string(),
            revision: Some(patchset),
        }
    }

    #[must_use]
    pub fn reference(connection: &str, project: &str, kind: ChangeKind, ref_name: &str) -> Self {
        debug_assert_ne!(kind, ChangeKind::Review, "use ChangeKey::review for reviews");
        Self {
            connection: connection.to_string(),
            project: Some(project.to_string()),
            kind,
            stable_id: ref_name.to_string(),
            revision: None,
        }
    }

    /// The identity used for supercedence: drops the revision so a
    /// newer patchset of the same review still maps to the same slot.
    #[must_use]
    pub fn identity(&self) -> (String, Option<String>, ChangeKind, String) {
        (
            self.connection.clone(),
            self.project.clone(),
            self.kind,
            self.stable_id.clone(),
        )
    }
}

impl fmt::Display for ChangeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}",
            self.connection,
            self.project.as_deref().unwrap_or("-"),
            self.kind,
            self.stable_id,
            self.revision.map_or_else(|| "-".to_string(), |r| r.to_string())
        )
    }
}

/// A `Depends-On: <id>`-style cross-repo change id (e.g. a Gerrit
/// `Change-Id`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChangeId(pub String);

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeState {
    Open,
    Merged,
    Abandoned,
}

impl MergeState {
    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(self, MergeState::Open)
    }
}

/// One reviewer vote, e.g. `Verified +1` from `jenkins`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub label: String,
    pub value: i32,
    pub by_username: String,
    pub by_email: String,
    pub granted_at: chrono::DateTime<chrono::Utc>,
}

impl Approval {
    #[must_use]
    pub fn age(&self, now: chrono::DateTime<chrono::Utc>) -> chrono::Duration {
        now - self.granted_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmitRequirementStatus {
    Satisfied,
    Unsatisfied,
}

/// A submit requirement as reported by the review system, with its
/// submittability expression kept verbatim so `canMerge` can check
/// whether an `allow_needs` label appears in it (see
/// `railyard-driver::gerrit::can_merge`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequirement {
    pub name: String,
    pub status: SubmitRequirementStatus,
    pub submittability_expression: String,
}

/// A review change: one revision (patchset) of an external unit of work
/// under review.
///
/// Dependency edges are tracked in four separate sets, matching the
/// upstream driver's own git-vs-commit-message split: a pipeline
/// consumer that only cares about "what does this depend on" should
/// use [`ReviewChange::needs`] /
/// [`ReviewChange::needed_by`], which fold the git and compat sets
/// together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewChange {
    pub key: ChangeKey,
    pub branch: String,
    pub commit_message: String,
    pub merge_state: MergeState,
    pub wip: bool,
    pub is_current_patchset: bool,
    pub approvals: Vec<Approval>,
    pub submit_requirements: Vec<SubmitRequirement>,
    pub missing_labels: BTreeSet<String>,
    pub content_hash: String,

    /// Parent-commit stacked dependency, if the parent is itself an open
    /// change.
    pub git_needs: BTreeSet<ChangeId>,
    /// `Depends-On:` trailers in the commit message.
    pub compat_needs: BTreeSet<ChangeId>,
    /// Reverse of `git_needs`, discovered by backward query.
    pub git_needed_by: BTreeSet<ChangeId>,
    /// Reverse of `compat_needs`.
    pub compat_needed_by: BTreeSet<ChangeId>,
    /// This change's own cross-repo id (e.g. Gerrit `Change-Id`), used as
    /// the target of other changes' `compat_needs`/`compat_needed_by`.
    pub change_id: ChangeId,
}

impl ReviewChange {
    /// Union of the git and commit-message depends-on sets.
    #[must_use]
    pub fn needs(&self) -> BTreeSet<ChangeId> {
        self.git_needs.union(&self.compat_needs).cloned().collect()
    }

    /// Union of the git and commit-message needed-by sets.
    #[must_use]
    pub fn needed_by(&self) -> BTreeSet<ChangeId> {
        self.git_needed_by.union(&self.compat_needed_by).cloned().collect()
    }
}

/// A branch, tag, or bare ref update: `(project, ref-name, old-rev,
/// new-rev)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefChange {
    pub key: ChangeKey,
    pub old_rev: String,
    pub new_rev: String,
}

/// One revision of an external unit of work, addressed by a
/// [`ChangeKey`]. Immutable by identity: a refresh produces a new
/// `Change` value with a bumped `version`, never a mutation in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Change {
    Review(ReviewChange),
    Branch(RefChange),
    Tag(RefChange),
    Ref(RefChange),
}

impl Change {
    #[must_use]
    pub fn key(&self) -> &ChangeKey {
        match self {
            Change::Review(c) => &c.key,
            Change::Branch(c) | Change::Tag(c) | Change::Ref(c) => &c.key,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        match self {
            Change::Review(c) => c.merge_state.is_open(),
            Change::Branch(_) | Change::Tag(_) | Change::Ref(_) => true,
        }
    }

    #[must_use]
    pub fn is_merged(&self) -> bool {
        matches!(self, Change::Review(c) if c.merge_state == MergeState::Merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn review(key: ChangeKey) -> ReviewChange {
        ReviewChange {
            key,
            branch: "main".into(),
            commit_message: String::new(),
            merge_state: MergeState::Open,
            wip: false,
            is_current_patchset: true,
            approvals: Vec::new(),
            submit_requirements: Vec::new(),
            missing_labels: BTreeSet::new(),
            content_hash: "deadbeef".into(),
            git_needs: BTreeSet::new(),
            compat_needs: BTreeSet::new(),
            git_needed_by: BTreeSet::new(),
            compat_needed_by: BTreeSet::new(),
            change_id: ChangeId("Iabc".into()),
        }
    }

    #[test]
    fn needs_unions_git_and_compat_sets() {
        let mut c = review(ChangeKey::review("gerrit", "p1", "100", 1));
        c.git_needs.insert(ChangeId("I1".into()));
        c.compat_needs.insert(ChangeId("I2".into()));
        let needs = c.needs();
        assert_eq!(needs.len(), 2);
        assert!(needs.contains(&ChangeId("I1".into())));
        assert!(needs.contains(&ChangeId("I2".into())));
    }

    #[test]
    fn identity_drops_revision_so_newer_patchsets_match() {
        let a = ChangeKey::review("gerrit", "p1", "100", 1);
        let b = ChangeKey::review("gerrit", "p1", "100", 2);
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn display_uses_dash_placeholders_for_missing_fields() {
        let k = ChangeKey::reference("gerrit", "p1", ChangeKind::Branch, "refs/heads/main");
        assert_eq!(format!("{k}"), "gerrit/p1/branch/refs/heads/main/-");
    }
}
