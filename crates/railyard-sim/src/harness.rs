use std::sync::Arc;

use railyard_cache::ChangeCache;
use railyard_coord::{CoordinationStore, MemoryStore, SessionId};
use railyard_dispatch::{BuildRequestState, DispatchError, ExecutorDispatch, NodeRequest};
use railyard_driver::GerritDriver;
use railyard_kernel::JobSpec;
use railyard_manager::{ManagerError, ManagementEvent, PipelineManager, PipelineState, ResultEvent};
use railyard_types::{Event, JobOutcome, Pipeline, TenantId, TriggerEvent};
use uuid::Uuid;

use crate::client::ScriptedGerritClient;

/// Drives one tenant/pipeline's [`PipelineManager`] step by step,
/// against an in-process [`MemoryStore`] and a [`ScriptedGerritClient`],
/// with no wall-clock waiting: every scenario advances by calling
/// [`Harness::tick`] (or the result-delivering helpers, which tick for
/// the caller) rather than sleeping for a real event connector or
/// executor to respond.
pub struct Harness {
    store: Arc<MemoryStore>,
    session: SessionId,
    tenant: TenantId,
    pipeline: Pipeline,
    specs: Vec<JobSpec>,
    client: Arc<ScriptedGerritClient>,
    driver: Arc<GerritDriver<MemoryStore>>,
    manager: PipelineManager<MemoryStore, GerritDriver<MemoryStore>>,
    state: PipelineState,
}

const NODE_REQUEST_ROOT: &str = "/node-requests";
const EXECUTOR_ROOT: &str = "/exec";
const CACHE_ROOT: &str = "/cache";

impl Harness {
    #[must_use]
    pub fn new(tenant: TenantId, pipeline: Pipeline, specs: Vec<JobSpec>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let session = store.begin_session();
        let client = Arc::new(ScriptedGerritClient::new());
        let cache = Arc::new(ChangeCache::new(store.clone(), CACHE_ROOT));
        let driver = Arc::new(GerritDriver::new("gerrit", client.clone(), cache).with_max_dependencies(pipeline.max_dependencies as usize));
        let manager = PipelineManager::new(store.clone(), session, tenant, pipeline.clone(), specs.clone(), driver.clone(), NODE_REQUEST_ROOT, EXECUTOR_ROOT);
        let state = manager.fresh_state();
        Self { store, session, tenant, pipeline, specs, client, driver, manager, state }
    }

    #[must_use]
    pub fn client(&self) -> &ScriptedGerritClient {
        &self.client
    }

    #[must_use]
    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    #[must_use]
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// The backing store, for tests that need to act as a second
    /// collaborator (an executor claiming a build under its own
    /// session) rather than the pipeline manager itself.
    #[must_use]
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    #[must_use]
    pub fn executors(&self) -> &ExecutorDispatch<MemoryStore> {
        self.manager.executors()
    }

    /// Reads a node request's current record straight from the
    /// coordination store, for scenarios that assert a cancelled
    /// request is no longer readable (S4, S5).
    pub fn node_requests_get(&self, request_id: &str) -> Result<NodeRequest, DispatchError> {
        self.manager.node_requests().get(request_id)
    }

    /// Runs replica-failure reconciliation without simulating a leader
    /// crash (S6's lost-build clause can be exercised against an
    /// executor session dying while the pipeline manager's own session
    /// stays live).
    pub async fn reconcile(&mut self) -> Result<(), ManagerError> {
        self.manager.reconcile_pub(&mut self.state)?;
        self.tick().await
    }

    /// Submits a trigger event and runs one tick, mirroring the event
    /// connector writing to the trigger queue after its settling delay
    /// and the manager picking it up on its next wakeup.
    pub async fn trigger(&mut self, event: TriggerEvent) -> Result<(), ManagerError> {
        let envelope = Event::new(event, chrono::Utc::now(), Uuid::new_v4());
        self.manager.submit_trigger(envelope, self.session)?;
        self.tick().await
    }

    pub async fn management(&mut self, event: ManagementEvent) -> Result<(), ManagerError> {
        let envelope = Event::new(event, chrono::Utc::now(), Uuid::new_v4());
        self.manager.submit_management(envelope, self.session)?;
        self.tick().await
    }

    pub async fn tick(&mut self) -> Result<(), ManagerError> {
        self.manager.tick(&mut self.state).await
    }

    /// Fulfils `job_name`'s outstanding node request for `item_id` with
    /// a single fake node, delivers the result event, and ticks —
    /// modelling the Node Request Service's watch firing and the
    /// manager submitting the job's build.
    pub async fn fulfill_node(&mut self, item_id: Uuid, job_name: &str) -> Result<(), ManagerError> {
        let request_id = self.job_field(item_id, job_name, |job| job.node_request_id.clone()).expect("job has an outstanding node request");
        self.manager.node_requests().fulfill(&request_id, vec!["node-1".into()])?;
        let event = ResultEvent::NodeFulfilled { item_id, job_name: job_name.to_string(), request_id };
        let envelope = Event::new(event, chrono::Utc::now(), Uuid::new_v4());
        self.manager.submit_result(envelope, self.session)?;
        self.tick().await
    }

    /// Delivers `job_name`'s build result for `item_id`: marks the
    /// executor's build request `Completed` and ticks.
    pub async fn complete_build(&mut self, item_id: Uuid, job_name: &str, outcome: JobOutcome) -> Result<(), ManagerError> {
        let build_id = self.job_field(item_id, job_name, |job| job.build_id.clone());
        if let Some(build_id) = &build_id {
            self.manager.executors().set_state(build_id, BuildRequestState::Completed)?;
        }
        let event = ResultEvent::BuildResult { item_id, job_name: job_name.to_string(), build_id, outcome };
        let envelope = Event::new(event, chrono::Utc::now(), Uuid::new_v4());
        self.manager.submit_result(envelope, self.session)?;
        self.tick().await
    }

    fn job_field<T>(&self, item_id: Uuid, job_name: &str, extract: impl Fn(&railyard_types::Job) -> T) -> Option<T> {
        self.state.queue.iter().find(|item| item.id == item_id).and_then(|item| item.build_set.jobs.iter().find(|j| j.name == job_name)).map(extract)
    }

    /// Simulates the replica holding the pipeline lock vanishing
    /// without a clean shutdown (S6): expires its session (dropping
    /// every ephemeral node it owned, including the pipeline lock and
    /// any node-allocation locks), then builds a fresh
    /// [`PipelineManager`] under a new session the way a successor
    /// replica would after winning the now-vacant lock, and runs
    /// reconciliation against the in-flight state.
    pub async fn crash_and_recover(&mut self) -> Result<(), ManagerError> {
        self.store.expire_session(self.session);
        self.session = self.store.begin_session();
        self.manager = PipelineManager::new(
            self.store.clone(),
            self.session,
            self.tenant,
            self.pipeline.clone(),
            self.specs.clone(),
            self.driver.clone(),
            NODE_REQUEST_ROOT,
            EXECUTOR_ROOT,
        );
        self.manager.reconcile_pub(&mut self.state)?;
        self.tick().await
    }
}
