use std::sync::Arc;
use std::time::Duration;

use railyard_coord::{CancelToken, CoordinationStore, SessionId};
use railyard_queue::{wait_for_settling, Election, EventQueue, QueueError};
use railyard_types::{Event, TriggerEvent};
use tracing::debug;
use uuid::Uuid;

/// The inbound, per-connection leg of event ingestion. A single
/// elected consumer drains this queue and
/// fans each event out to whichever (tenant, pipeline) trigger queues
/// want it — those per-(tenant, pipeline) queues are
/// [`railyard_queue::EventQueue`]s the pipeline manager itself drains
/// under its own lock, so this connector's only job is the first hop:
/// native event in, settled and durable, ready to be routed.
pub struct EventConnector<S: CoordinationStore> {
    connection: String,
    settling_delay: Duration,
    queue: EventQueue<TriggerEvent, S>,
    election: Election<S>,
}

fn connection_root(connection: &str) -> String {
    format!("/railyard/events/connection/{connection}")
}

impl<S: CoordinationStore> EventConnector<S> {
    #[must_use]
    pub fn new(store: Arc<S>, connection: impl Into<String>, settling_delay: Duration) -> Self {
        let connection = connection.into();
        let root = connection_root(&connection);
        Self {
            queue: EventQueue::new(store.clone(), format!("{root}/inbound")),
            election: Election::new(store, format!("{root}/lock")),
            connection,
            settling_delay,
        }
    }

    #[must_use]
    pub fn connection(&self) -> &str {
        &self.connection
    }

    /// Holds `event` for its settling delay (an absolute floor from
    /// the event's own timestamp, not a debounce) and then
    /// durably enqueues it. Any caller on any replica may ingest; only
    /// the elected leader (see [`Self::run`]) drains.
    pub async fn ingest(&self, event: TriggerEvent, session: SessionId) -> Result<String, QueueError> {
        wait_for_settling(event.timestamp, self.settling_delay).await;
        let envelope = Event::new(event, chrono::Utc::now(), Uuid::new_v4());
        self.queue.put(&envelope, session)
    }

    /// Contends for single-consumer leadership over this connection's
    /// inbound queue and, while leading, drains it, handing each
    /// settled event to `on_event` before acking. `on_event` routes the
    /// event onward (typically [`crate::Daemon::submit_event`] against
    /// every tenant configured for this connection); a routing failure
    /// is logged and the item is still acked rather than poisoning the
    /// queue with an event no route can accept.
    pub async fn run<F>(&self, cancel: &CancelToken, session: SessionId, mut on_event: F) -> Result<(), QueueError>
    where
        F: FnMut(TriggerEvent),
    {
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }
            let Some(handle) = self.election.try_become_leader(session)? else {
                let mut rx = self.election.watch();
                tokio::select! {
                    () = cancel.cancelled() => return Ok(()),
                    _ = rx.changed() => continue,
                }
            };
            debug!(connection = %self.connection, "became leader of inbound event connector");

            let mut rx = self.queue.watch();
            loop {
                for (path, event) in self.queue.iter()? {
                    on_event(event.payload);
                    self.queue.ack(&path)?;
                }
                tokio::select! {
                    () = cancel.cancelled() => {
                        self.election.resign(&handle)?;
                        return Ok(());
                    }
                    _ = rx.changed() => {}
                    () = tokio::time::sleep(Duration::from_millis(200)) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use railyard_coord::MemoryStore;
    use railyard_types::TriggerEventType;

    fn event(timestamp: chrono::DateTime<chrono::Utc>) -> TriggerEvent {
        TriggerEvent {
            event_type: TriggerEventType::PatchsetCreated,
            connection: "gerrit".into(),
            project_hostname: "review.example.org".into(),
            project_name: "p1".into(),
            branch: None,
            ref_name: None,
            old_rev: None,
            new_rev: None,
            change_number: Some("100".into()),
            patch_number: Some(1),
            approvals: Vec::new(),
            comment: None,
            timestamp,
            event_id: Uuid::new_v4(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ingest_waits_out_the_settling_delay_before_becoming_visible() {
        let store = Arc::new(MemoryStore::new());
        let session = store.begin_session();
        let connector = EventConnector::new(store, "gerrit", Duration::from_secs(10));

        let start = tokio::time::Instant::now();
        connector.ingest(event(chrono::Utc::now()), session).await.unwrap();
        assert!(tokio::time::Instant::now() - start >= Duration::from_secs(10));
    }

    #[tokio::test]
    async fn run_dispatches_drained_events_and_stops_on_cancel() {
        let store = Arc::new(MemoryStore::new());
        let session = store.begin_session();
        let connector = Arc::new(EventConnector::new(store, "gerrit", Duration::ZERO));
        connector.ingest(event(chrono::Utc::now()), session).await.unwrap();

        let cancel = CancelToken::new();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let connector_clone = connector.clone();
        let cancel_clone = cancel.clone();
        let handle = tokio::spawn(async move {
            connector_clone
                .run(&cancel_clone, session, |event| seen_clone.lock().unwrap().push(event.change_number))
                .await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!(seen.lock().unwrap().as_slice(), [Some("100".to_string())]);
    }
}
