use std::sync::Arc;

use railyard_driver::SourceDriver;
use railyard_types::ChangeKey;
use tracing::{info, warn};

use crate::error::ReportError;
use crate::truncate::{truncate_message, GERRIT_COMMENT_LIMIT};
use railyard_coord::{retry_with_backoff, DEFAULT_BACKOFF};

/// Outcome of reporting a single change within a (possibly multi-change)
/// terminal report.
#[derive(Debug, Clone)]
pub struct MemberOutcome {
    pub key: ChangeKey,
    pub phase1: Result<(), String>,
    pub phase2: Option<Result<(), String>>,
}

/// Reports terminal queue-item results to the review system.
/// Phase-1 (posting the message and votes) and phase-2 (the upstream
/// submit/merge attempt) are separate calls so a phase-2 failure never
/// re-triggers phase-1 — a change must not be re-voted just because its
/// merge attempt failed.
pub struct Reporter<D> {
    driver: Arc<D>,
}

impl<D: SourceDriver> Reporter<D> {
    #[must_use]
    pub fn new(driver: Arc<D>) -> Self {
        Self { driver }
    }

    /// Reports a single-change item: phase-1 always, phase-2 only when
    /// `attempt_merge` is set (i.e. the item succeeded).
    pub async fn report(&self, key: &ChangeKey, message: &str, attempt_merge: bool) -> Result<(), ReportError> {
        let message = truncate_message(message, GERRIT_COMMENT_LIMIT);
        self.report_phase1(key, &message).await?;
        if attempt_merge {
            self.report_phase2(key).await?;
        }
        Ok(())
    }

    async fn report_phase1(&self, key: &ChangeKey, message: &str) -> Result<(), ReportError> {
        retry_with_backoff(&DEFAULT_BACKOFF, || async {
            self.driver.report(key, message, true, false).map_err(ReportError::Phase1)
        })
        .await
    }

    async fn report_phase2(&self, key: &ChangeKey) -> Result<(), ReportError> {
        retry_with_backoff(&DEFAULT_BACKOFF, || async {
            self.driver.report(key, "", false, true).map_err(ReportError::Phase2)
        })
        .await
    }

    /// Reports a cycle-bundle item: every member gets its phase-1 message
    /// independently and unconditionally, since the vote/comment must
    /// land on each change regardless of how the bundle as a whole
    /// resolves. Phase-2 is then attempted member by member; the first
    /// failure stops the sweep so a later replica resumes from the
    /// members it can see already succeeded rather than re-merging ones
    /// already merged (invariant I4: all members merge, or none do, as
    /// enforced by whichever of them the upstream review system treats
    /// as atomic).
    pub async fn report_bundle(&self, keys: &[ChangeKey], message: &str, attempt_merge: bool) -> Vec<MemberOutcome> {
        let message = truncate_message(message, GERRIT_COMMENT_LIMIT);
        let mut outcomes = Vec::with_capacity(keys.len());
        let mut phase1_failed = false;
        for key in keys {
            let result = self.report_phase1(key, &message).await;
            if let Err(err) = &result {
                phase1_failed = true;
                warn!(?key, %err, "bundle member phase-1 report failed");
            }
            outcomes.push(MemberOutcome { key: key.clone(), phase1: result.map_err(|e| e.to_string()), phase2: None });
        }

        if !attempt_merge || phase1_failed {
            return outcomes;
        }

        let mut stop = false;
        for outcome in &mut outcomes {
            if stop {
                break;
            }
            let result = self.report_phase2(&outcome.key).await;
            if result.is_err() {
                stop = true;
            } else {
                info!(key = ?outcome.key, "bundle member merged");
            }
            outcome.phase2 = Some(result.map_err(|e| e.to_string()));
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use railyard_driver::DriverError;
    use railyard_types::{Change, TriggerEvent};
    use std::sync::Mutex;

    #[derive(Default)]
    struct StubDriver {
        calls: Mutex<Vec<(String, bool, bool)>>,
        fail_phase2_for: Mutex<Vec<String>>,
    }

    impl SourceDriver for StubDriver {
        fn is_merged(&self, _key: &ChangeKey, _wait_for_head: bool) -> Result<bool, DriverError> {
            unimplemented!()
        }
        fn can_merge(&self, _key: &ChangeKey, _allow_needs: &[String]) -> Result<bool, DriverError> {
            unimplemented!()
        }
        fn change_key(&self, _event: &TriggerEvent) -> Option<ChangeKey> {
            unimplemented!()
        }
        fn get_change(&self, _key: &ChangeKey, _refresh: bool) -> Result<Change, DriverError> {
            unimplemented!()
        }
        fn get_changes_depending_on(&self, _key: &ChangeKey, _projects: Option<&[String]>) -> Result<Vec<Change>, DriverError> {
            unimplemented!()
        }
        fn get_changes_by_topic(&self, _topic: &str) -> Result<Vec<Change>, DriverError> {
            unimplemented!()
        }
        fn get_project_open_changes(&self, _project: &str) -> Result<Vec<Change>, DriverError> {
            unimplemented!()
        }
        fn get_ref_sha(&self, _project: &str, _ref_name: &str) -> Result<String, DriverError> {
            unimplemented!()
        }
        fn get_git_url(&self, _project: &str) -> String {
            unimplemented!()
        }
        fn report(&self, key: &ChangeKey, message: &str, phase1: bool, phase2: bool) -> Result<(), DriverError> {
            let id = key.to_string();
            self.calls.lock().unwrap().push((id.clone(), phase1, phase2));
            let _ = message;
            if phase2 && self.fail_phase2_for.lock().unwrap().iter().any(|failing| failing == &id) {
                return Err(DriverError::BadRequest { key: key.clone(), message: "merge conflict".into() });
            }
            Ok(())
        }
    }

    fn key(number: &str) -> ChangeKey {
        ChangeKey::review("gerrit", "proj", number, 1)
    }

    #[tokio::test]
    async fn report_posts_phase1_then_phase2_on_success() {
        let driver = Arc::new(StubDriver::default());
        let reporter = Reporter::new(driver.clone());
        reporter.report(&key("1"), "all good", true).await.unwrap();
        let calls = driver.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        let id = key("1").to_string();
        assert_eq!(calls[0], (id.clone(), true, false));
        assert_eq!(calls[1], (id, false, true));
    }

    #[tokio::test]
    async fn report_skips_phase2_when_merge_is_not_attempted() {
        let driver = Arc::new(StubDriver::default());
        let reporter = Reporter::new(driver.clone());
        reporter.report(&key("1"), "failed", false).await.unwrap();
        let calls = driver.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].1, "phase1 flag must be set");
        assert!(!calls[0].2, "phase2 must not run");
    }

    #[tokio::test]
    async fn bundle_reports_phase1_for_every_member_before_any_phase2() {
        let driver = Arc::new(StubDriver::default());
        let reporter = Reporter::new(driver.clone());
        let keys = vec![key("1"), key("2")];
        let outcomes = reporter.report_bundle(&keys, "bundle ok", true).await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.phase1.is_ok()));
        assert!(outcomes.iter().all(|o| matches!(&o.phase2, Some(Ok(())))));
    }

    #[tokio::test]
    async fn bundle_phase2_stops_sweeping_after_the_first_failure_but_keeps_earlier_successes() {
        let driver = Arc::new(StubDriver { fail_phase2_for: Mutex::new(vec![key("1").to_string()]), ..Default::default() });
        let reporter = Reporter::new(driver);
        let keys = vec![key("1"), key("2")];
        let outcomes = reporter.report_bundle(&keys, "bundle", true).await;
        assert!(outcomes[0].phase2.as_ref().unwrap().is_err());
        assert!(outcomes[1].phase2.is_none(), "sweep stops once a member fails, roll forward rather than roll back");
    }
}
