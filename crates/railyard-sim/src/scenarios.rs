//! End-to-end scenarios, each driven through [`crate::Harness`]
//! without any wall-clock waiting.

use chrono::Utc;
use railyard_kernel::JobSpec;
use railyard_manager::ManagementEvent;
use railyard_types::{
    ItemStatus, JobOutcome, ManagerKind, Pipeline, Precedence, RequirementSpec, TenantId, TriggerEvent, TriggerEventType, TriggerSpec, Window,
};
use uuid::Uuid;

use crate::client::scripted_change;
use crate::harness::Harness;

fn trigger_spec() -> TriggerSpec {
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

fn patchset_created(number: &str, patchset: u32) -> TriggerEvent {
    TriggerEvent {
        event_type: TriggerEventType::PatchsetCreated,
        connection: "gerrit".into(),
        project_hostname: "review.example.org".into(),
        project_name: "p1".into(),
        branch: Some("refs/heads/main".into()),
        ref_name: None,
        old_rev: None,
        new_rev: None,
        change_number: Some(number.into()),
        patch_number: Some(patchset),
        approvals: Vec::new(),
        comment: None,
        timestamp: Utc::now(),
        event_id: Uuid::new_v4(),
    }
}

fn pipeline(manager_kind: ManagerKind, triggers: Vec<TriggerSpec>, requirements: RequirementSpec, window: Window) -> Pipeline {
    Pipeline {
        name: "check".into(),
        manager_kind,
        triggers,
        requirements,
        reporters: Vec::new(),
        window,
        precedence: Precedence::Normal,
        max_dependencies: Pipeline::DEFAULT_MAX_DEPENDENCIES,
    }
}

fn one_job() -> Vec<JobSpec> {
    vec![JobSpec::new("build", vec!["ubuntu-noble".into()])]
}

/// S1: a simple check pipeline runs one job to success and reports
/// exactly once, with no merge attempt (no pipeline here is gated).
#[tokio::test]
async fn s1_simple_check_runs_to_success_and_reports_once() {
    let pipeline = pipeline(ManagerKind::Independent, vec![trigger_spec()], RequirementSpec::default(), Window::new(4, 1, 4));
    let mut sim = Harness::new(TenantId::new(1), pipeline, one_job());
    sim.client().with_change(scripted_change("100", "I100"));

    sim.trigger(patchset_created("100", 1)).await.unwrap();
    assert_eq!(sim.state().queue.len(), 1, "the trigger must enqueue exactly one item");

    let item_id = sim.state().queue[0].id;
    sim.fulfill_node(item_id, "build").await.unwrap();
    sim.complete_build(item_id, "build", JobOutcome::Completed).await.unwrap();

    assert_eq!(sim.state().queue[0].status, ItemStatus::Completed);
    let reviews = sim.client().posted_reviews();
    assert_eq!(reviews.len(), 1, "a terminal item must report exactly once");
    assert!(reviews[0].2.contains("SUCCESS"));
    assert!(sim.client().submits().is_empty(), "an independent pipeline never attempts a merge");
}

/// S2: a pipeline that only enqueues on a sufficiently fresh approval
/// ignores a stale vote and accepts a fresh one.
#[tokio::test]
async fn s2_requires_an_approval_newer_than_24h() {
    let mut spec = trigger_spec();
    spec.event_type = "^comment-added$".into();
    spec.approval_label = Some("Verified".into());
    spec.approval_value = Some(1);
    spec.approval_username = Some("jenkins".into());
    spec.approval_newer_than = Some(chrono::Duration::hours(24));

    let pipeline = pipeline(ManagerKind::Independent, vec![spec], RequirementSpec::default(), Window::new(4, 1, 4));
    let mut sim = Harness::new(TenantId::new(1), pipeline, one_job());
    sim.client().with_change(scripted_change("100", "I100"));

    let mut stale = patchset_created("200", 1);
    stale.event_type = TriggerEventType::CommentAdded;
    stale.change_number = Some("200".into());
    stale.approvals.push(railyard_types::Approval {
        label: "Verified".into(),
        value: 1,
        by_username: "jenkins".into(),
        by_email: "jenkins@example.org".into(),
        granted_at: Utc::now() - chrono::Duration::hours(72),
    });
    sim.trigger(stale).await.unwrap();
    assert!(sim.state().queue.is_empty(), "a 72h-old approval must not satisfy a 24h bound");

    let mut fresh = patchset_created("100", 1);
    fresh.event_type = TriggerEventType::CommentAdded;
    fresh.approvals.push(railyard_types::Approval {
        label: "Verified".into(),
        value: 1,
        by_username: "jenkins".into(),
        by_email: "jenkins@example.org".into(),
        granted_at: Utc::now() - chrono::Duration::minutes(5),
    });
    sim.trigger(fresh).await.unwrap();
    assert_eq!(sim.state().queue.len(), 1, "a fresh approval must satisfy the bound and enqueue");
}

/// S3: two changes in a symmetric cross-repo `Depends-On` cycle enqueue
/// and report as a single bundle.
#[tokio::test]
async fn s3_cross_repo_depends_on_cycle_enqueues_as_one_bundle() {
    let pipeline = pipeline(ManagerKind::Independent, vec![trigger_spec()], RequirementSpec::default(), Window::new(4, 1, 4));
    let mut sim = Harness::new(TenantId::new(1), pipeline, one_job());

    sim.client().with_change(scripted_change("100", "I100"));
    sim.client().with_change(scripted_change("200", "I200"));
    // 100's reverse (commit-message) dependents: 200 names 100 in a
    // `Depends-On:` trailer.
    sim.client().with_needed_by("I100", vec![("200".into(), 1)]);
    // Reused by both `get_changes_depending_on`'s id-to-number lookup
    // and 200's own forward refresh (its change-id is also I200):
    // resolves "who is I200" and "what does I200 depend on" (100,
    // closing the cycle) in one scripted answer.
    sim.client().with_depends_on("I200", vec![("200".into(), 1), ("100".into(), 1)]);

    sim.trigger(patchset_created("100", 1)).await.unwrap();
    assert_eq!(sim.state().queue.len(), 1, "the bundle occupies a single queue slot");
    let item = &sim.state().queue[0];
    assert!(item.is_bundle());
    assert_eq!(item.live_changes.len(), 2);

    let item_id = item.id;
    sim.fulfill_node(item_id, "build").await.unwrap();
    sim.complete_build(item_id, "build", JobOutcome::Completed).await.unwrap();

    let reviews = sim.client().posted_reviews();
    let reported_numbers: std::collections::BTreeSet<_> = reviews.iter().map(|(number, _, _)| number.clone()).collect();
    assert_eq!(reported_numbers, std::collections::BTreeSet::from(["100".to_string(), "200".to_string()]), "both bundle members must be reported");
}

/// S4: in a gated (dependent) pipeline, a predecessor's failure resets
/// every item behind it to run again from scratch.
#[tokio::test]
async fn s4_predecessor_failure_resets_later_items() {
    let pipeline = pipeline(ManagerKind::Dependent, vec![trigger_spec()], RequirementSpec::default(), Window::new(4, 1, 4));
    let mut sim = Harness::new(TenantId::new(1), pipeline, one_job());
    sim.client().with_change(scripted_change("100", "I100"));
    sim.client().with_change(scripted_change("101", "I101"));

    sim.trigger(patchset_created("100", 1)).await.unwrap();
    sim.trigger(patchset_created("101", 1)).await.unwrap();
    assert_eq!(sim.state().queue.len(), 2);

    let head_id = sim.state().queue[0].id;
    let behind_id = sim.state().queue[1].id;
    let behind_request = sim.state().queue[1].build_set.jobs[0].node_request_id.clone();
    assert!(behind_request.is_some(), "the speculative successor must already have an outstanding node request");

    sim.fulfill_node(head_id, "build").await.unwrap();
    sim.complete_build(head_id, "build", JobOutcome::Failed).await.unwrap();

    assert_eq!(sim.state().queue[0].status, ItemStatus::Completed, "the failed head still reaches a terminal report");
    let behind = sim.state().queue.iter().find(|i| i.id == behind_id).unwrap();
    assert_eq!(behind.status, ItemStatus::New, "the successor is reset rather than left to finish speculatively");
    assert_eq!(behind.build_set.jobs[0].outcome, JobOutcome::Waiting);
    assert!(
        sim.node_requests_get(&behind_request.unwrap()).is_err(),
        "the successor's cancelled node request must no longer be readable"
    );
}

/// S5: a supercedent pipeline dequeues and cancels the older item when
/// a newer trigger arrives for the same change identity.
#[tokio::test]
async fn s5_supercedent_pipeline_cancels_the_superceded_item() {
    let pipeline = pipeline(ManagerKind::Supercedent, vec![trigger_spec()], RequirementSpec::default(), Window::new(4, 1, 4));
    let mut sim = Harness::new(TenantId::new(1), pipeline, one_job());
    sim.client().with_change(scripted_change("100", "I100"));

    sim.trigger(patchset_created("100", 1)).await.unwrap();
    assert_eq!(sim.state().queue.len(), 1);
    let first_request = sim.state().queue[0].build_set.jobs[0].node_request_id.clone().unwrap();

    sim.trigger(patchset_created("100", 2)).await.unwrap();
    assert_eq!(sim.state().queue.len(), 2, "the newer trigger enqueues a second item rather than replacing in place");
    assert_eq!(sim.state().queue[0].status, ItemStatus::Dequeued, "the older item for the same identity is superceded");
    assert!(sim.node_requests_get(&first_request).is_err(), "the superceded item's node request is cancelled");
    assert_ne!(sim.state().queue[1].status, ItemStatus::Dequeued);
}

/// S6: a build's executor vanishing (its claim lock's session
/// expiring) without the pipeline manager's own session expiring is
/// detected and re-reported as failed by reconciliation.
#[tokio::test]
async fn s6_lost_build_is_recovered_by_reconciliation() {
    let pipeline = pipeline(ManagerKind::Independent, vec![trigger_spec()], RequirementSpec::default(), Window::new(4, 1, 4));
    let mut sim = Harness::new(TenantId::new(1), pipeline, one_job());
    sim.client().with_change(scripted_change("100", "I100"));

    sim.trigger(patchset_created("100", 1)).await.unwrap();
    let item_id = sim.state().queue[0].id;
    sim.fulfill_node(item_id, "build").await.unwrap();

    let build_id = sim.state().queue[0].build_set.jobs[0].build_id.clone().unwrap();
    let executor_session = sim.store().begin_session();
    sim.executors().claim(&build_id, executor_session).unwrap();
    sim.executors().set_state(&build_id, railyard_dispatch::BuildRequestState::Running).unwrap();

    use railyard_coord::CoordinationStore;
    sim.store().expire_session(executor_session);

    sim.reconcile().await.unwrap();

    let job = &sim.state().queue[0].build_set.jobs[0];
    assert_eq!(job.outcome, JobOutcome::Failed, "a build whose executor vanished must be reported failed, not left hanging forever");
}

/// A management `Dequeue` event removes an item outright, independent
/// of any trigger or result event.
#[tokio::test]
async fn management_dequeue_removes_an_item() {
    let pipeline = pipeline(ManagerKind::Independent, vec![trigger_spec()], RequirementSpec::default(), Window::new(4, 1, 4));
    let mut sim = Harness::new(TenantId::new(1), pipeline, one_job());
    sim.client().with_change(scripted_change("100", "I100"));

    sim.trigger(patchset_created("100", 1)).await.unwrap();
    let item_id = sim.state().queue[0].id;
    sim.management(ManagementEvent::Dequeue { item_id }).await.unwrap();

    assert_eq!(sim.state().queue[0].status, ItemStatus::Dequeued);
}
