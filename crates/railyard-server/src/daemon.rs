use std::collections::HashMap;
use std::sync::Arc;

use railyard_coord::{CancelToken, CoordinationStore, SessionId};
use railyard_config::Layout;
use railyard_driver::SourceDriver;
use railyard_manager::PipelineManager;
use railyard_types::{Event, TenantId, TriggerEvent};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::connector::EventConnector;
use crate::error::ServerError;

/// Ties one replica's worth of [`PipelineManager`]s together: one per
/// (tenant, pipeline) in the loaded [`Layout`], all sharing a single
/// coordination-store session (a session is a *replica's* liveness
/// token, not a per-pipeline one) and a single cancellable lifetime.
///
/// Generic over one [`SourceDriver`] because this workspace ships one
/// connector (Gerrit); a deployment serving multiple source
/// connections runs one [`Daemon`] per connection, each with its own
/// driver and its own tenant subset of
/// the layout.
pub struct Daemon<S: CoordinationStore, D: SourceDriver> {
    store: Arc<S>,
    session: SessionId,
    cancel: CancelToken,
    managers: HashMap<(u64, String), Arc<PipelineManager<S, D>>>,
}

impl<S, D> Daemon<S, D>
where
    S: CoordinationStore + 'static,
    D: SourceDriver + 'static,
{
    /// Builds one [`PipelineManager`] per pipeline of every tenant in
    /// `layout`, all driven by `driver`.
    #[must_use]
    pub fn new(store: Arc<S>, driver: Arc<D>, config: &ServerConfig, layout: &Layout) -> Self {
        let session = store.begin_session();
        let mut managers = HashMap::new();
        for tenant_config in &layout.tenants {
            let tenant = tenant_config.to_tenant();
            for pipeline_config in &tenant_config.pipelines {
                let pipeline = pipeline_config.to_pipeline();
                let specs = pipeline_config.jobs.iter().map(railyard_config::JobConfig::to_spec).collect();
                let manager = PipelineManager::new(
                    store.clone(),
                    session,
                    tenant.id,
                    pipeline,
                    specs,
                    driver.clone(),
                    config.node_request_root.clone(),
                    config.executor_root.clone(),
                );
                managers.insert((tenant.id.into(), pipeline_config.name.clone()), Arc::new(manager));
            }
        }
        info!(tenants = layout.tenants.len(), pipelines = managers.len(), "daemon wired from layout");
        Self { store, session, cancel: CancelToken::new(), managers }
    }

    #[must_use]
    pub fn session(&self) -> SessionId {
        self.session
    }

    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn manager(&self, tenant: TenantId, pipeline: &str) -> Result<&Arc<PipelineManager<S, D>>, ServerError> {
        self.managers
            .get(&(tenant.into(), pipeline.to_string()))
            .ok_or_else(|| ServerError::UnknownPipeline(tenant.into(), pipeline.to_string()))
    }

    /// Spawns every configured pipeline's main loop as its own
    /// task. Each task runs until [`Self::shutdown`] cancels it.
    pub fn spawn_all(&self) -> Vec<JoinHandle<()>> {
        self.managers
            .values()
            .cloned()
            .map(|manager| {
                let cancel = self.cancel.clone();
                tokio::spawn(async move {
                    if let Err(err) = manager.run(&cancel).await {
                        warn!(error = %err, "pipeline manager loop exited with an error");
                    }
                })
            })
            .collect()
    }

    /// Broadcasts one already-settled [`TriggerEvent`] into every
    /// configured pipeline's trigger queue. Each pipeline's own `tick` decides whether its
    /// trigger specs and requirements actually admit it; the
    /// layout here carries no project-to-tenant ownership map, so fan-out plus each
    /// pipeline's own predicates is this daemon's routing strategy.
    pub fn submit_event(&self, event: TriggerEvent) -> Result<(), ServerError> {
        for manager in self.managers.values() {
            let envelope = Event::new(event.clone(), event.timestamp, event.event_id);
            manager.submit_trigger(envelope, self.session)?;
        }
        Ok(())
    }

    /// Requests every owned task to stop. Idempotent.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Spawns every pipeline loop, then blocks until either `cancel` is
    /// externally triggered or Ctrl+C is received, then requests
    /// shutdown and waits for every task to finish.
    pub async fn run_with_shutdown(&self) -> Result<(), ServerError> {
        let handles = self.spawn_all();
        tokio::select! {
            () = self.cancel.cancelled() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("received shutdown signal");
            }
        }
        self.shutdown();
        for handle in handles {
            let _ = handle.await;
        }
        Ok(())
    }

    /// Runs an [`EventConnector`] for `connection` until shutdown,
    /// broadcasting every settled event it drains into this daemon's
    /// pipelines via [`Self::submit_event`].
    pub async fn run_connector(&self, connector: &EventConnector<S>) -> Result<(), ServerError> {
        let session = self.session;
        connector
            .run(&self.cancel, session, |event| {
                if let Err(err) = self.submit_event(event) {
                    warn!(error = %err, "failed to route an inbound event into any pipeline");
                }
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use railyard_cache::ChangeCache;
    use railyard_coord::MemoryStore;
    use railyard_config::{Layout, PipelineConfig, TenantConfig};
    use railyard_driver::{GerritChangeData, GerritClient, GerritDriver};
    use railyard_types::{Approval, MergeState};
    use std::collections::BTreeSet;

    struct NullClient;
    impl GerritClient for NullClient {
        fn query_change(&self, number: &str, _patchset: Option<u32>) -> Result<GerritChangeData, railyard_driver::DriverError> {
            Ok(GerritChangeData {
                project: "p1".into(),
                branch: "refs/heads/main".into(),
                number: number.into(),
                patchset: 1,
                is_current_patchset: true,
                change_id: format!("I{number}"),
                commit_message: String::new(),
                merge_state: MergeState::Open,
                wip: false,
                approvals: Vec::<Approval>::new(),
                submit_requirements: Vec::new(),
                missing_labels: BTreeSet::new(),
                content_hash: "h".into(),
                git_parent_dependency: None,
            })
        }
        fn query_change_by_change_id(&self, _: &str) -> Result<Vec<(String, u32)>, railyard_driver::DriverError> {
            Ok(Vec::new())
        }
        fn query_needed_by(&self, _: &str) -> Result<Vec<(String, u32)>, railyard_driver::DriverError> {
            Ok(Vec::new())
        }
        fn query_submitted_together(&self, _: &str) -> Result<Vec<(String, u32)>, railyard_driver::DriverError> {
            Ok(Vec::new())
        }
        fn get_ref_sha(&self, _: &str, _: &str) -> Result<String, railyard_driver::DriverError> {
            Ok("deadbeef".into())
        }
        fn post_review(&self, _: &str, _: u32, _: &str) -> Result<(), railyard_driver::DriverError> {
            Ok(())
        }
        fn submit(&self, _: &str, _: u32) -> Result<(), railyard_driver::DriverError> {
            Ok(())
        }
        fn project_open_changes(&self, _: &str) -> Result<Vec<String>, railyard_driver::DriverError> {
            Ok(Vec::new())
        }
    }

    fn layout() -> Layout {
        Layout {
            tenants: vec![TenantConfig {
                id: 1,
                name: "openstack".into(),
                pipelines: vec![PipelineConfig { name: "check".into(), ..Default::default() }],
            }],
        }
    }

    #[test]
    fn new_builds_one_manager_per_configured_pipeline() {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(ChangeCache::new(store.clone(), "/cache/gerrit"));
        let driver = Arc::new(GerritDriver::new("gerrit", Arc::new(NullClient), cache));
        let config = ServerConfig::new();
        let daemon = Daemon::new(store, driver, &config, &layout());

        assert!(daemon.manager(TenantId::new(1), "check").is_ok());
        assert!(daemon.manager(TenantId::new(1), "gate").is_err());
        assert!(daemon.manager(TenantId::new(2), "check").is_err());
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_cancels_the_token() {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(ChangeCache::new(store.clone(), "/cache/gerrit"));
        let driver = Arc::new(GerritDriver::new("gerrit", Arc::new(NullClient), cache));
        let config = ServerConfig::new();
        let daemon = Daemon::new(store, driver, &config, &layout());

        daemon.shutdown();
        daemon.shutdown();
        assert!(daemon.cancel_token().is_cancelled());
    }
}
