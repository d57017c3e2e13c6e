use std::time::Duration;

use chrono::{DateTime, Utc};
use railyard_coord::{CancelToken, CoordinationStore, SessionId};
use railyard_dispatch::{DispatchError, ExecutorDispatch, NodeRequestService};
use railyard_driver::SourceDriver;
use railyard_kernel::{
    advance, apply_build_result, apply_node_failed, apply_node_fulfilled, on_head_result, requirement_satisfied,
    speculative_reset, trigger_matches, Effect, ItemResult, JobSpec,
};
use railyard_queue::{Election, EventQueue};
use railyard_reporter::Reporter;
use railyard_types::{Change, ChangeKey, ItemStatus, JobOutcome, ManagerKind, Pipeline, Precedence, QueueItem, ReviewChange, TenantId, TriggerEvent};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::ManagerError;
use crate::events::{ManagementEvent, ResultEvent};
use crate::paths;
use crate::state::{PipelineState, PipelineStateStore};

/// The numeric node-request priority a pipeline's configured
/// [`Precedence`] maps to: lower sorts sooner, matching the Node
/// Request Service's own "numeric, lower is sooner" ordering,
/// with the CS-assigned creation sequence left to break ties.
fn priority_for(precedence: Precedence) -> i32 {
    match precedence {
        Precedence::High => 0,
        Precedence::Normal => 100,
        Precedence::Low => 200,
    }
}

/// Cancellation sweep over one item's non-terminal jobs: mirrors
/// `railyard_kernel::speculative_reset`'s own cancellation loop, but
/// for a item being dequeued outright (supercedence) rather than
/// re-frozen in place.
fn cancel_item_in_flight(item: &QueueItem) -> Vec<Effect> {
    let mut effects = Vec::new();
    for job in &item.build_set.jobs {
        if job.outcome.is_terminal() {
            continue;
        }
        if job.outcome == JobOutcome::NodeRequested {
            if let Some(request_id) = &job.node_request_id {
                effects.push(Effect::CancelNodeRequest { job_name: job.name.clone(), request_id: request_id.clone() });
            }
        }
        if matches!(job.outcome, JobOutcome::Starting | JobOutcome::Running | JobOutcome::Paused) {
            if let Some(build_id) = &job.build_id {
                effects.push(Effect::AbortBuild { job_name: job.name.clone(), build_id: build_id.clone() });
            }
        }
    }
    effects
}

fn renumber(queue: &mut [QueueItem]) {
    for (idx, item) in queue.iter_mut().enumerate() {
        item.previous = idx.checked_sub(1);
        item.current = idx;
    }
}

/// Owns one tenant/pipeline pair's main loop: leader election over its
/// CS lock, draining its three event queues, advancing every
/// non-terminal item head-to-tail, and executing the resulting
/// [`Effect`]s against node allocation, the executor fleet, and the
/// configured reporters.
pub struct PipelineManager<S: CoordinationStore, D: SourceDriver> {
    session: SessionId,
    tenant: TenantId,
    pipeline: Pipeline,
    specs: Vec<JobSpec>,
    driver: Arc<D>,
    state_store: PipelineStateStore<S>,
    election: Election<S>,
    triggers: EventQueue<TriggerEvent, S>,
    management: EventQueue<ManagementEvent, S>,
    results: EventQueue<ResultEvent, S>,
    node_requests: NodeRequestService<S>,
    executors: ExecutorDispatch<S>,
    reporter: Reporter<D>,
}

impl<S: CoordinationStore, D: SourceDriver> PipelineManager<S, D> {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<S>,
        session: SessionId,
        tenant: TenantId,
        pipeline: Pipeline,
        specs: Vec<JobSpec>,
        driver: Arc<D>,
        node_request_root: impl Into<String>,
        executor_root: impl Into<String>,
    ) -> Self {
        let root = paths::pipeline_root(&tenant.to_string(), &pipeline.name);
        Self {
            state_store: PipelineStateStore::new(store.clone(), paths::summary_path(&root)),
            election: Election::new(store.clone(), paths::lock_path(&root)),
            triggers: EventQueue::new(store.clone(), paths::trigger_queue_path(&root)),
            management: EventQueue::new(store.clone(), paths::management_queue_path(&root)),
            results: EventQueue::new(store.clone(), paths::result_queue_path(&root)),
            node_requests: NodeRequestService::new(store.clone(), node_request_root.into()),
            executors: ExecutorDispatch::new(store, executor_root.into()),
            reporter: Reporter::new(driver.clone()),
            session,
            tenant,
            pipeline,
            specs,
            driver,
        }
    }

    /// Runs until `cancel` fires: contend for the pipeline lock,
    /// reconcile any replica-failure debris once leadership is won,
    /// then tick on every event-queue wakeup until leadership or
    /// cancellation is lost.
    pub async fn run(&self, cancel: &CancelToken) -> Result<(), ManagerError> {
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let Some(handle) = self.election.try_become_leader(self.session)? else {
                let mut rx = self.election.watch();
                tokio::select! {
                    () = cancel.cancelled() => return Ok(()),
                    _ = rx.changed() => continue,
                }
            };
            info!(tenant = %self.tenant, pipeline = %self.pipeline.name, "acquired pipeline lock");

            let mut state = self.state_store.read()?.unwrap_or_else(|| PipelineState::fresh(self.pipeline.window));
            self.reconcile(&mut state)?;

            let mut trigger_rx = self.triggers.watch();
            let mut mgmt_rx = self.management.watch();
            let mut result_rx = self.results.watch();

            loop {
                self.tick(&mut state).await?;
                tokio::select! {
                    () = cancel.cancelled() => {
                        self.election.resign(&handle)?;
                        return Ok(());
                    }
                    _ = trigger_rx.changed() => {}
                    _ = mgmt_rx.changed() => {}
                    _ = result_rx.changed() => {}
                    () = tokio::time::sleep(Duration::from_millis(200)) => {}
                }
            }
        }
    }

    /// The session this manager instance holds ephemeral state under
    /// (lock, node-allocation locks). Exposed so a caller driving the
    /// manager step-by-step — `railyard-sim`'s scenario harness,
    /// `railyard-server`'s ingestion endpoints — can submit events and
    /// fulfil requests on the same session without reaching into
    /// private fields.
    #[must_use]
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// A fresh, empty [`PipelineState`] for this pipeline's configured
    /// window — the same value [`Self::run`] starts from when no
    /// summary has been persisted yet.
    #[must_use]
    pub fn fresh_state(&self) -> PipelineState {
        PipelineState::fresh(self.pipeline.window)
    }

    #[must_use]
    pub fn node_requests(&self) -> &NodeRequestService<S> {
        &self.node_requests
    }

    #[must_use]
    pub fn executors(&self) -> &ExecutorDispatch<S> {
        &self.executors
    }

    /// Enqueues a trigger event for this pipeline's
    /// trigger queue. In a real deployment the event connector writes
    /// here after the settling delay;
    /// driven directly by tests and the simulation harness.
    pub fn submit_trigger(&self, event: railyard_types::Event<TriggerEvent>, session: SessionId) -> Result<String, ManagerError> {
        Ok(self.triggers.put(&event, session)?)
    }

    pub fn submit_management(&self, event: railyard_types::Event<ManagementEvent>, session: SessionId) -> Result<String, ManagerError> {
        Ok(self.management.put(&event, session)?)
    }

    /// Enqueues a result event: in a real
    /// deployment a small adapter bridges the Node Request Service's
    /// and Executor Dispatch's own watches into these, rather than the
    /// manager polling them directly.
    pub fn submit_result(&self, event: railyard_types::Event<ResultEvent>, session: SessionId) -> Result<String, ManagerError> {
        Ok(self.results.put(&event, session)?)
    }

    /// Runs replica-failure reconciliation against the
    /// given state without requiring the pipeline lock — used by the
    /// simulation harness to model a successor replica picking up
    /// after a predecessor's session expired (S6).
    pub fn reconcile_pub(&self, state: &mut PipelineState) -> Result<(), ManagerError> {
        self.reconcile(state)
    }

    /// One pass of the main loop: drain every event queue,
    /// advance every non-terminal item, and persist the result. Public
    /// so a deterministic scenario harness can step the manager without
    /// going through [`Self::run`]'s wall-clock `select!`.
    pub async fn tick(&self, state: &mut PipelineState) -> Result<(), ManagerError> {
        let now = Utc::now();

        for (path, event) in self.triggers.iter()? {
            self.handle_trigger(state, &event.payload, now)?;
            self.triggers.ack(&path)?;
        }
        for (path, event) in self.management.iter()? {
            self.handle_management(state, &event.payload);
            self.management.ack(&path)?;
        }
        for (path, event) in self.results.iter()? {
            self.handle_result(state, &event.payload).await?;
            self.results.ack(&path)?;
        }

        self.advance_all(state).await?;
        self.state_store.write(state)?;
        Ok(())
    }

    fn handle_trigger(&self, state: &mut PipelineState, event: &TriggerEvent, now: DateTime<Utc>) -> Result<(), ManagerError> {
        let mut matched = false;
        for spec in &self.pipeline.triggers {
            if trigger_matches(spec, event, now)? {
                matched = true;
                break;
            }
        }
        if !matched {
            return Ok(());
        }

        let Some(key) = self.driver.change_key(event) else {
            debug!(connection = %event.connection, "trigger event did not resolve to a change key");
            return Ok(());
        };
        let change = self.driver.get_change(&key, true)?;

        let Change::Review(review) = &change else {
            return self.enqueue(state, vec![key], now);
        };

        if !requirement_satisfied(&self.pipeline.requirements, review) {
            debug!(%key, "change does not satisfy pipeline requirements");
            return Ok(());
        }

        let members = self.resolve_bundle(&key, review)?;
        let mut live_changes = Vec::with_capacity(members.len());
        for member_key in &members {
            let member_change = if *member_key == key { change.clone() } else { self.driver.get_change(member_key, false)? };
            if let Change::Review(member_review) = &member_change {
                if !requirement_satisfied(&self.pipeline.requirements, member_review) {
                    debug!(%member_key, "bundle member does not satisfy pipeline requirements, rejecting enqueue");
                    return Ok(());
                }
            }
            live_changes.push(member_key.clone());
        }

        self.enqueue(state, live_changes, now)
    }

    /// Folds a cross-repo cycle bundle into one set of live changes
    ///:
    /// a dependent discovered by the reverse query is included only
    /// when the reference is symmetric, i.e. each side actually names
    /// the other, rather than a plain one-way dependency.
    fn resolve_bundle(&self, key: &ChangeKey, change: &ReviewChange) -> Result<Vec<ChangeKey>, ManagerError> {
        let mut members = vec![key.clone()];
        if change.needs().is_empty() && change.needed_by().is_empty() {
            return Ok(members);
        }
        let dependents = self.driver.get_changes_depending_on(key, None)?;
        for dependent in dependents {
            let Change::Review(dep) = &dependent else { continue };
            let cycles_back = dep.needs().contains(&change.change_id) || dep.needed_by().contains(&change.change_id);
            let we_reference_it = change.needs().contains(&dep.change_id) || change.needed_by().contains(&dep.change_id);
            if cycles_back && we_reference_it {
                members.push(dependent.key().clone());
            }
        }
        Ok(members)
    }

    fn enqueue(&self, state: &mut PipelineState, live_changes: Vec<ChangeKey>, now: DateTime<Utc>) -> Result<(), ManagerError> {
        if self.pipeline.manager_kind == ManagerKind::Supercedent {
            if let Some(identity) = live_changes.first().map(ChangeKey::identity) {
                for item in &mut state.queue {
                    if item.is_terminal() || item.supercedence_identity().as_ref() != Some(&identity) {
                        continue;
                    }
                    info!(item_id = %item.id, "superceded by a newer trigger for the same identity");
                    for effect in cancel_item_in_flight(item) {
                        match effect {
                            Effect::CancelNodeRequest { request_id, .. } => self.node_requests.cancel(&request_id)?,
                            Effect::AbortBuild { build_id, .. } => self.executors.request_cancel(&build_id)?,
                            _ => {}
                        }
                    }
                    item.status = ItemStatus::Dequeued;
                }
            }
        }
        let position = state.queue.len();
        state.queue.push(QueueItem::new(live_changes, position, now));
        Ok(())
    }

    fn handle_management(&self, state: &mut PipelineState, event: &ManagementEvent) {
        match event {
            ManagementEvent::Enqueue { live_changes } => {
                let position = state.queue.len();
                state.queue.push(QueueItem::new(live_changes.clone(), position, Utc::now()));
            }
            ManagementEvent::Dequeue { item_id } => {
                if let Some(item) = state.queue.iter_mut().find(|i| i.id == *item_id) {
                    item.status = ItemStatus::Dequeued;
                }
            }
            ManagementEvent::Promote { item_id } => {
                if let Some(pos) = state.queue.iter().position(|i| i.id == *item_id) {
                    let item = state.queue.remove(pos);
                    state.queue.insert(0, item);
                    renumber(&mut state.queue);
                }
            }
        }
    }

    async fn handle_result(&self, state: &mut PipelineState, event: &ResultEvent) -> Result<(), ManagerError> {
        let item_id = event.item_id();
        let Some(index) = state.queue.iter().position(|i| i.id == item_id) else {
            debug!(%item_id, "result event for an item no longer in the queue");
            return Ok(());
        };

        let effects = {
            let item = &mut state.queue[index];
            match event {
                ResultEvent::NodeFulfilled { job_name, request_id, .. } => apply_node_fulfilled(item, job_name, request_id.clone())?,
                ResultEvent::NodeFailed { job_name, .. } => {
                    apply_node_failed(item, job_name)?;
                    Vec::new()
                }
                ResultEvent::BuildResult { job_name, build_id, outcome, .. } => {
                    apply_build_result(item, job_name, build_id.clone(), *outcome)?;
                    Vec::new()
                }
            }
        };
        self.execute_item_effects(&mut state.queue[index], effects).await
    }

    /// Advances every non-terminal item head-to-tail, honoring the
    /// AIMD window: only the first `window.current` non-terminal items
    /// are admitted to run concurrently, the remainder sit at `New`
    /// until the window or the queue drains. In a gated pipeline, a predecessor's failure
    /// triggers a speculative reset of every item behind it (S4).
    async fn advance_all(&self, state: &mut PipelineState) -> Result<(), ManagerError> {
        let window = state.window.current as usize;
        let mut active_slots = 0usize;
        let mut predecessor_failed = false;
        let is_gated = matches!(self.pipeline.manager_kind, ManagerKind::Dependent | ManagerKind::Serial);

        for idx in 0..state.queue.len() {
            if state.queue[idx].is_terminal() {
                continue;
            }

            if predecessor_failed && is_gated {
                let effects = speculative_reset(&mut state.queue[idx], &self.specs);
                self.execute_item_effects(&mut state.queue[idx], effects).await?;
                continue;
            }

            if active_slots >= window.max(1) {
                continue;
            }
            active_slots += 1;

            let effects = advance(&mut state.queue[idx], &self.specs, self.pipeline.precedence);
            let failed = effects.iter().any(|e| matches!(e, Effect::Report { result: ItemResult::Failure }));
            let is_head = idx == 0;
            let head_result = effects.iter().find_map(|e| match e {
                Effect::Report { result } => Some(*result),
                _ => None,
            });

            self.execute_item_effects(&mut state.queue[idx], effects).await?;

            if failed && is_gated {
                predecessor_failed = true;
            }
            if is_head {
                if let Some(result) = head_result {
                    on_head_result(&mut state.window, result);
                }
            }
        }
        Ok(())
    }

    async fn execute_item_effects(&self, item: &mut QueueItem, effects: Vec<Effect>) -> Result<(), ManagerError> {
        for effect in effects {
            match effect {
                Effect::RequestNodes { job_name, nodeset, precedence } => {
                    let priority = priority_for(precedence);
                    let request_id = self.node_requests.submit(nodeset, priority, 0, self.session)?;
                    if let Some(job) = item.build_set.job_mut(&job_name) {
                        job.node_request_id = Some(request_id);
                    }
                }
                Effect::CancelNodeRequest { request_id, .. } => {
                    self.node_requests.cancel(&request_id)?;
                }
                Effect::SubmitBuild { job_name, zone, variables } => {
                    let request_id = self.executors.submit(zone.as_deref(), variables, self.session)?;
                    if let Some(job) = item.build_set.job_mut(&job_name) {
                        job.build_id = Some(request_id);
                    }
                }
                Effect::AbortBuild { build_id, .. } => {
                    self.executors.request_cancel(&build_id)?;
                }
                Effect::Report { result } => {
                    let message = self.report_message(item, result);
                    let attempt_merge = result == ItemResult::Success && matches!(self.pipeline.manager_kind, ManagerKind::Dependent | ManagerKind::Serial);
                    self.deliver_report(item, &message, attempt_merge).await;
                    item.status = ItemStatus::Completed;
                    item.reported_at = Some(Utc::now());
                }
                Effect::AttemptMerge => {
                    // folded into the Report branch above: phase-2 of the same
                    // reporter call is the merge attempt.
                }
            }
        }
        Ok(())
    }

    fn report_message(&self, item: &QueueItem, result: ItemResult) -> String {
        let verdict = match result {
            ItemResult::Success => "SUCCESS",
            ItemResult::Failure => "FAILURE",
        };
        let mut lines = vec![format!("{verdict}")];
        for job in &item.build_set.jobs {
            lines.push(format!("- {} : {:?}", job.name, job.outcome));
        }
        lines.join("\n")
    }

    async fn deliver_report(&self, item: &QueueItem, message: &str, attempt_merge: bool) {
        if item.is_bundle() {
            let outcomes = self.reporter.report_bundle(&item.live_changes, message, attempt_merge).await;
            for outcome in &outcomes {
                if let Err(err) = &outcome.phase1 {
                    warn!(key = %outcome.key, %err, "bundle member phase-1 report failed");
                }
            }
        } else if let Some(key) = item.live_changes.first() {
            if let Err(err) = self.reporter.report(key, message, attempt_merge).await {
                warn!(%key, %err, "terminal report failed");
            }
        }
    }

    fn zones(&self) -> Vec<Option<String>> {
        let mut zones: Vec<Option<String>> = self.specs.iter().map(|s| s.executor_zone.clone()).collect();
        zones.push(None);
        zones.sort();
        zones.dedup();
        zones
    }

    /// Replica-failure recovery: re-reports lost builds as
    /// failed, and resubmits node requests whose replica vanished
    /// before associating an outcome. The third clause — a cycle
    /// bundle interrupted mid-report — needs no dedicated code here:
    /// an item left in `Reporting` with `reported_at` unset is not
    /// terminal, so the next [`advance`] call naturally re-emits
    /// `Effect::Report` and the reporter's own bundle sweep rolls
    /// forward from whichever members already succeeded (S6).
    fn reconcile(&self, state: &mut PipelineState) -> Result<(), ManagerError> {
        for zone in self.zones() {
            for request_id in self.executors.lost_requests(zone.as_deref())? {
                for item in &mut state.queue {
                    if item.is_terminal() {
                        continue;
                    }
                    if let Some(job) = item.build_set.jobs.iter_mut().find(|j| j.build_id.as_deref() == Some(request_id.as_str())) {
                        if matches!(job.outcome, JobOutcome::Starting | JobOutcome::Running | JobOutcome::Paused) {
                            warn!(job = %job.name, request_id, "build has no executor lock, reporting lost");
                            job.outcome = JobOutcome::Failed;
                        }
                    }
                }
            }
        }

        for item in &mut state.queue {
            if item.is_terminal() {
                continue;
            }
            for job in &mut item.build_set.jobs {
                if job.outcome != JobOutcome::NodeRequested {
                    continue;
                }
                let Some(request_id) = job.node_request_id.clone() else { continue };
                if matches!(self.node_requests.get(&request_id), Err(DispatchError::NotFound(_))) {
                    warn!(job = %job.name, request_id, "node request vanished with its replica, resubmitting");
                    job.node_request_id = None;
                    job.outcome = JobOutcome::Waiting;
                }
            }
        }
        Ok(())
    }
}
