use std::collections::BTreeMap;

use railyard_types::{ItemStatus, Job, JobOutcome, Precedence, QueueItem};

use crate::effects::{Effect, ItemResult};
use crate::error::KernelError;
use crate::freeze::{freeze_build_set, JobSpec};

/// The per-item advance step of the pipeline manager's main loop
///. Pure: takes the item and the
/// pipeline's job specs, mutates the item in place, and returns the
/// effects the runtime must carry out. Freezing happens at most once
/// per item unless a speculative reset re-opens it.
pub fn advance(item: &mut QueueItem, specs: &[JobSpec], precedence: Precedence) -> Vec<Effect> {
    if item.is_terminal() {
        return Vec::new();
    }

    if !item.build_set.frozen {
        item.build_set = freeze_build_set(specs);
    }

    let mut effects = Vec::new();
    let outcomes: BTreeMap<&str, JobOutcome> = item.build_set.jobs.iter().map(|j| (j.name.as_str(), j.outcome)).collect();

    for job in &mut item.build_set.jobs {
        if job.outcome != JobOutcome::Waiting {
            continue;
        }
        // A dependency that reached a terminal, non-successful state will
        // never satisfy this job's prerequisites; skip it so the item can
        // still reach all_terminal() rather than wedging forever.
        let blocked = job
            .depends_on
            .iter()
            .any(|dep| outcomes.get(dep.as_str()).is_some_and(|o| o.is_terminal() && !o.is_success()));
        if blocked {
            job.outcome = JobOutcome::Skipped;
        } else if job.node_request_id.is_none() && job.prerequisites_met(&outcomes) {
            job.outcome = JobOutcome::NodeRequested;
            effects.push(Effect::RequestNodes {
                job_name: job.name.clone(),
                nodeset: job.nodeset.clone(),
                precedence,
            });
        }
    }

    if item.build_set.all_terminal() {
        let result = if item.build_set.all_success() { ItemResult::Success } else { ItemResult::Failure };
        item.status = ItemStatus::Reporting;
        effects.push(Effect::Report { result });
        if result == ItemResult::Success {
            effects.push(Effect::AttemptMerge);
        }
    } else if item.build_set.jobs.iter().any(|j| !matches!(j.outcome, JobOutcome::Waiting)) {
        item.status = ItemStatus::Running;
    }

    effects
}

/// A node request for `job_name` was fulfilled: submit its build
///.
pub fn apply_node_fulfilled(item: &mut QueueItem, job_name: &str, request_id: String) -> Result<Vec<Effect>, KernelError> {
    let job = job_mut(item, job_name)?;
    if job.outcome != JobOutcome::NodeRequested {
        return Ok(Vec::new());
    }
    job.node_request_id = Some(request_id);
    job.outcome = JobOutcome::Starting;
    Ok(vec![Effect::SubmitBuild {
        job_name: job.name.clone(),
        zone: job.executor_zone.clone(),
        variables: job.variables.clone(),
    }])
}

/// A node request for `job_name` failed or was cancelled upstream: the
/// job is marked failed so the item's terminal computation proceeds
/// (a stuck node request must not wedge the queue forever).
pub fn apply_node_failed(item: &mut QueueItem, job_name: &str) -> Result<(), KernelError> {
    let job = job_mut(item, job_name)?;
    job.outcome = JobOutcome::Failed;
    Ok(())
}

/// An executor reported `job_name` entering `outcome`. Terminal-success propagation of artifacts/variables to
/// dependent jobs happens implicitly: [`advance`] re-evaluates
/// `prerequisites_met` against the updated outcome map on its next
/// call.
pub fn apply_build_result(item: &mut QueueItem, job_name: &str, build_id: Option<String>, outcome: JobOutcome) -> Result<(), KernelError> {
    let job = job_mut(item, job_name)?;
    if build_id.is_some() {
        job.build_id = build_id;
    }
    job.outcome = outcome;
    Ok(())
}

/// Invalidates a QueueItem's in-flight work and re-freezes it against
/// a fresh speculative job graph: every non-terminal job's outstanding node request is
/// cancelled, every in-flight build is aborted, and the build set is
/// reset to `Waiting` so [`advance`] starts the item over. Used when a
/// predecessor in a gated pipeline fails (invariant tested in S4).
pub fn speculative_reset(item: &mut QueueItem, specs: &[JobSpec]) -> Vec<Effect> {
    let mut effects = Vec::new();
    for job in &item.build_set.jobs {
        if job.outcome.is_terminal() {
            continue;
        }
        if job.outcome == JobOutcome::NodeRequested {
            if let Some(request_id) = &job.node_request_id {
                effects.push(Effect::CancelNodeRequest {
                    job_name: job.name.clone(),
                    request_id: request_id.clone(),
                });
            }
        }
        if matches!(job.outcome, JobOutcome::Starting | JobOutcome::Running | JobOutcome::Paused) {
            if let Some(build_id) = &job.build_id {
                effects.push(Effect::AbortBuild {
                    job_name: job.name.clone(),
                    build_id: build_id.clone(),
                });
            }
        }
    }
    item.build_set = freeze_build_set(specs);
    item.status = ItemStatus::New;
    effects
}

fn job_mut<'a>(item: &'a mut QueueItem, job_name: &str) -> Result<&'a mut Job, KernelError> {
    item.build_set.job_mut(job_name).ok_or_else(|| KernelError::UnknownJob(job_name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use railyard_types::ChangeKey;

    fn item() -> QueueItem {
        QueueItem::new(vec![ChangeKey::review("gerrit", "p1", "100", 1)], 0, Utc::now())
    }

    fn specs() -> Vec<JobSpec> {
        vec![
            JobSpec::new("build", vec!["ubuntu".into()]),
            JobSpec::new("test", vec!["ubuntu".into()]).depends_on(["build"]),
        ]
    }

    #[test]
    fn advance_freezes_and_requests_nodes_for_roots_only() {
        let mut item = item();
        let effects = advance(&mut item, &specs(), Precedence::Normal);
        assert!(item.build_set.frozen);
        assert_eq!(effects.len(), 1, "only the root job should request nodes: {effects:?}");
        assert!(matches!(&effects[0], Effect::RequestNodes { job_name, .. } if job_name == "build"));
    }

    #[test]
    fn advance_is_idempotent_once_a_job_already_has_a_request() {
        let mut item = item();
        advance(&mut item, &specs(), Precedence::Normal);
        let effects = advance(&mut item, &specs(), Precedence::Normal);
        assert!(effects.is_empty(), "must not re-request nodes for an already-requested job");
    }

    #[test]
    fn fulfilling_the_root_unblocks_the_dependent() {
        let mut item = item();
        advance(&mut item, &specs(), Precedence::Normal);
        apply_node_fulfilled(&mut item, "build", "req-1".into()).unwrap();
        apply_build_result(&mut item, "build", Some("build-1".into()), JobOutcome::Completed).unwrap();
        let effects = advance(&mut item, &specs(), Precedence::Normal);
        assert!(effects.iter().any(|e| matches!(e, Effect::RequestNodes { job_name, .. } if job_name == "test")));
    }

    #[test]
    fn all_jobs_terminal_and_successful_reports_success_and_attempts_merge() {
        let mut item = item();
        advance(&mut item, &specs(), Precedence::Normal);
        apply_build_result(&mut item, "build", None, JobOutcome::Completed).unwrap();
        advance(&mut item, &specs(), Precedence::Normal);
        apply_build_result(&mut item, "test", None, JobOutcome::Completed).unwrap();
        let effects = advance(&mut item, &specs(), Precedence::Normal);
        assert!(effects.contains(&Effect::Report { result: ItemResult::Success }));
        assert!(effects.contains(&Effect::AttemptMerge));
    }

    #[test]
    fn a_failed_root_skips_the_dependent_and_reports_failure_without_merge() {
        let mut item = item();
        advance(&mut item, &specs(), Precedence::Normal);
        apply_build_result(&mut item, "build", None, JobOutcome::Failed).unwrap();
        let effects = advance(&mut item, &specs(), Precedence::Normal);
        assert!(effects.contains(&Effect::Report { result: ItemResult::Failure }));
        assert!(!effects.contains(&Effect::AttemptMerge));
        let test_job = item.build_set.job_mut("test").unwrap();
        assert_eq!(test_job.outcome, JobOutcome::Skipped, "the dependent never ran because its prerequisite failed");
    }

    #[test]
    fn speculative_reset_cancels_outstanding_node_requests_and_reopens_the_item() {
        let mut item = item();
        advance(&mut item, &specs(), Precedence::Normal);
        let effects = speculative_reset(&mut item, &specs());
        assert!(effects.iter().any(|e| matches!(e, Effect::CancelNodeRequest { job_name, .. } if job_name == "build")));
        assert_eq!(item.status, ItemStatus::New);
        assert_eq!(item.build_set.job_mut("build").unwrap().outcome, JobOutcome::Waiting);
    }
}
