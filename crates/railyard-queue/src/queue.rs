use std::marker::PhantomData;
use std::sync::Arc;

use railyard_coord::{CoordError, CoordinationStore, CreateMode, SessionId};
use railyard_types::Event;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::debug;

use crate::error::QueueError;

/// A durable, ordered, multi-consumer event queue, realised as a
/// persistent-sequential node per item under `root`. CS
/// assigns the ten-digit sequence suffix, so lexicographic child order
/// is already delivery order (invariant: "strictly by CS sequence
/// number").
pub struct EventQueue<P, S: CoordinationStore> {
    store: Arc<S>,
    root: String,
    _payload: PhantomData<fn() -> P>,
}

impl<P, S: CoordinationStore> EventQueue<P, S>
where
    P: Serialize + DeserializeOwned,
{
    #[must_use]
    pub fn new(store: Arc<S>, root: impl Into<String>) -> Self {
        Self { store, root: root.into(), _payload: PhantomData }
    }

    /// `put(payload, trace-context)`: creates a sequential child,
    /// returning its CS path as the item identifier.
    pub fn put(&self, event: &Event<P>, session: SessionId) -> Result<String, QueueError> {
        let bytes = serde_json::to_vec(event)?;
        let path = self.store.create(&format!("{}/item-", self.root), bytes, CreateMode::PersistentSequential, session)?;
        debug!(path, "enqueued event");
        Ok(path)
    }

    /// `iter()`: yields unacknowledged items in CS-sequence order, each
    /// paired with the path to pass to [`Self::ack`].
    pub fn iter(&self) -> Result<Vec<(String, Event<P>)>, QueueError> {
        let mut children = self.store.children(&self.root)?;
        children.sort_unstable();
        let mut items = Vec::with_capacity(children.len());
        for child in children {
            let path = format!("{}/{child}", self.root);
            let Some(node) = self.store.read(&path)? else {
                // Raced with a concurrent ack; at-least-once delivery
                // tolerates this.
                continue;
            };
            let event: Event<P> = serde_json::from_slice(&node.data)?;
            items.push((path, event));
        }
        Ok(items)
    }

    /// `ack(id)`: deletes the item. Idempotent — a missing node is not
    /// an error, matching "consumers must be idempotent on ack".
    pub fn ack(&self, item_path: &str) -> Result<(), QueueError> {
        match self.store.delete(item_path, None) {
            Ok(()) | Err(CoordError::NoNode { .. }) => Ok(()),
            Err(other) => Err(other.into()),
        }
    }

    /// A watch firing whenever the queue's child set changes. A
    /// callback-based registration is expressed as this receiver
    /// driven from a caller's select loop instead, so losing interest
    /// is just dropping the receiver rather than returning `false`.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.store.watch(&self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use railyard_coord::MemoryStore;
    use uuid::Uuid;

    #[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
    struct Payload {
        kind: String,
    }

    fn queue() -> (EventQueue<Payload, MemoryStore>, SessionId) {
        let store = Arc::new(MemoryStore::new());
        let session = store.begin_session();
        (EventQueue::new(store, "/queue/gerrit"), session)
    }

    fn event(kind: &str) -> Event<Payload> {
        Event::new(Payload { kind: kind.into() }, chrono::Utc::now(), Uuid::new_v4())
    }

    #[test]
    fn put_then_iter_preserves_insertion_order() {
        let (queue, session) = queue();
        queue.put(&event("a"), session).unwrap();
        queue.put(&event("b"), session).unwrap();
        queue.put(&event("c"), session).unwrap();

        let items = queue.iter().unwrap();
        let kinds: Vec<_> = items.iter().map(|(_, e)| e.payload.kind.clone()).collect();
        assert_eq!(kinds, vec!["a", "b", "c"]);
    }

    #[test]
    fn ack_removes_item_and_is_idempotent() {
        let (queue, session) = queue();
        queue.put(&event("a"), session).unwrap();
        let (path, _) = queue.iter().unwrap().remove(0);

        queue.ack(&path).unwrap();
        assert!(queue.iter().unwrap().is_empty());
        queue.ack(&path).unwrap();
    }

    #[test]
    fn iter_skips_items_raced_away_by_a_concurrent_ack() {
        let (queue, session) = queue();
        queue.put(&event("a"), session).unwrap();
        let (path, _) = queue.iter().unwrap().remove(0);
        queue.ack(&path).unwrap();
        assert!(queue.iter().unwrap().is_empty());
    }

    #[test]
    fn watch_fires_on_put() {
        let (queue, session) = queue();
        let mut rx = queue.watch();
        let before = *rx.borrow();
        queue.put(&event("a"), session).unwrap();
        assert!(rx.has_changed().unwrap());
        assert_ne!(*rx.borrow_and_update(), before);
    }
}
