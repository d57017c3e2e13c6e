use chrono::{DateTime, Utc};
use railyard_types::{ReviewChange, RequirementSpec, TriggerEvent, TriggerSpec};
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpecError {
    #[error("invalid regex {pattern:?}: {source}")]
    BadRegex { pattern: String, #[source] source: regex::Error },
}

/// A [`TriggerSpec`] matches an event when all of its typed predicates
/// match: event-type regex, ref
/// regex, and — when an approval was attached to the event — label,
/// value, username, and age bounds.
pub fn trigger_matches(spec: &TriggerSpec, event: &TriggerEvent, now: DateTime<Utc>) -> Result<bool, SpecError> {
    let type_re = compile(&spec.event_type)?;
    if !type_re.is_match(event.event_type.as_str()) {
        return Ok(false);
    }

    if let Some(pattern) = &spec.ref_regex {
        let re = compile(pattern)?;
        let subject = event.ref_name.as_deref().or(event.branch.as_deref()).unwrap_or("");
        if !re.is_match(subject) {
            return Ok(false);
        }
    }

    if spec.approval_label.is_some() || spec.approval_value.is_some() || spec.approval_username.is_some() {
        let matched = event.approvals.iter().any(|a| {
            spec.approval_label.as_deref().is_none_or(|label| label == a.label)
                && spec.approval_value.is_none_or(|value| value == a.value)
                && spec.approval_username.as_deref().is_none_or(|user| user == a.by_username)
                && spec.approval_newer_than.is_none_or(|max_age| a.age(now) <= max_age)
                && spec.approval_older_than.is_none_or(|min_age| a.age(now) >= min_age)
        });
        if !matched {
            return Ok(false);
        }
    }

    Ok(true)
}

fn compile(pattern: &str) -> Result<Regex, SpecError> {
    Regex::new(pattern).map_err(|source| SpecError::BadRegex { pattern: pattern.to_string(), source })
}

/// A conjunctive pipeline-level predicate evaluated on the change
/// itself. Also used to re-check a non-live
/// dependency change (a dependency whose gating vote was removed
/// blocks its dependent, per the same section).
#[must_use]
pub fn requirement_satisfied(spec: &RequirementSpec, change: &ReviewChange) -> bool {
    if spec.require_open && change.merge_state != railyard_types::MergeState::Open {
        return false;
    }
    if spec.require_current_patchset && !change.is_current_patchset {
        return false;
    }
    if let Some(label) = &spec.require_approval_label {
        let min = spec.require_approval_min_value.unwrap_or(1);
        let has_it = change.approvals.iter().any(|a| &a.label == label && a.value >= min);
        if !has_it {
            return false;
        }
    }
    if let Some(label) = &spec.reject_approval_label {
        let has_reject = change.approvals.iter().any(|a| &a.label == label && a.value < 0);
        if has_reject {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use railyard_types::{Approval, ChangeId, ChangeKey, MergeState};
    use std::collections::BTreeSet;

    fn event(event_type: &str) -> TriggerEvent {
        TriggerEvent {
            event_type: match event_type {
                "comment-added" => railyard_types::TriggerEventType::CommentAdded,
                _ => railyard_types::TriggerEventType::PatchsetCreated,
            },
            connection: "gerrit".into(),
            project_hostname: "review.example.org".into(),
            project_name: "p1".into(),
            branch: Some("refs/heads/main".into()),
            ref_name: None,
            old_rev: None,
            new_rev: None,
            change_number: Some("100".into()),
            patch_number: Some(1),
            approvals: Vec::new(),
            comment: None,
            timestamp: Utc::now(),
            event_id: uuid::Uuid::new_v4(),
        }
    }

    fn spec() -> TriggerSpec {
        TriggerSpec {
            event_type: "^patchset-created$".into(),
            ref_regex: None,
            approval_label: None,
            approval_value: None,
            approval_username: None,
            approval_newer_than: None,
            approval_older_than: None,
        }
    }

    #[test]
    fn matches_on_event_type_regex() {
        assert!(trigger_matches(&spec(), &event("patchset-created"), Utc::now()).unwrap());
        assert!(!trigger_matches(&spec(), &event("comment-added"), Utc::now()).unwrap());
    }

    #[test]
    fn approval_age_bound_enforced() {
        let mut s = spec();
        s.event_type = "^comment-added$".into();
        s.approval_label = Some("Verified".into());
        s.approval_value = Some(1);
        s.approval_username = Some("jenkins".into());
        s.approval_newer_than = Some(chrono::Duration::hours(24));

        let now = Utc::now();
        let mut e = event("comment-added");
        e.approvals.push(Approval {
            label: "Verified".into(),
            value: 1,
            by_username: "jenkins".into(),
            by_email: "jenkins@example.org".into(),
            granted_at: now - chrono::Duration::hours(72),
        });
        assert!(!trigger_matches(&s, &e, now).unwrap(), "a 72h-old approval must not satisfy a 24h bound (S2)");

        let mut e2 = event("comment-added");
        e2.approvals.push(Approval {
            label: "Verified".into(),
            value: 1,
            by_username: "jenkins".into(),
            by_email: "jenkins@example.org".into(),
            granted_at: now - chrono::Duration::minutes(5),
        });
        assert!(trigger_matches(&s, &e2, now).unwrap(), "a fresh approval must satisfy the bound (S2)");
    }

    fn review(merge_state: MergeState, current: bool) -> ReviewChange {
        ReviewChange {
            key: ChangeKey::review("gerrit", "p1", "100", 1),
            branch: "main".into(),
            commit_message: String::new(),
            merge_state,
            wip: false,
            is_current_patchset: current,
            approvals: Vec::new(),
            submit_requirements: Vec::new(),
            missing_labels: BTreeSet::new(),
            content_hash: "h".into(),
            git_needs: BTreeSet::new(),
            compat_needs: BTreeSet::new(),
            git_needed_by: BTreeSet::new(),
            compat_needed_by: BTreeSet::new(),
            change_id: ChangeId("I1".into()),
        }
    }

    #[test]
    fn requirement_rejects_non_open_and_stale_patchsets() {
        let spec = RequirementSpec::default();
        assert!(requirement_satisfied(&spec, &review(MergeState::Open, true)));
        assert!(!requirement_satisfied(&spec, &review(MergeState::Merged, true)));
        assert!(!requirement_satisfied(&spec, &review(MergeState::Open, false)));
    }

    #[test]
    fn requirement_enforces_reject_label() {
        let mut spec = RequirementSpec::default();
        spec.reject_approval_label = Some("Verified".into());
        let mut change = review(MergeState::Open, true);
        change.approvals.push(Approval {
            label: "Verified".into(),
            value: -1,
            by_username: "someone".into(),
            by_email: "someone@example.org".into(),
            granted_at: Utc::now(),
        });
        assert!(!requirement_satisfied(&spec, &change));
    }
}
