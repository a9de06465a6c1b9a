use tokio::sync::mpsc;

use super::types::{LiveQuery, Snapshot, SnapshotEvent, StreamFailure};

/// Receiving end of one live query registration.
///
/// The first event is always the snapshot current at registration time.
pub struct SnapshotStream {
    query: LiveQuery,
    events: mpsc::UnboundedReceiver<SnapshotEvent>,
}

impl SnapshotStream {
    pub(crate) fn new(query: LiveQuery, events: mpsc::UnboundedReceiver<SnapshotEvent>) -> Self {
        Self { query, events }
    }

    pub fn query(&self) -> &LiveQuery {
        &self.query
    }

    /// Waits for the next event. `None` once the store dropped the watcher or after `cancel`.
    pub async fn recv(&mut self) -> Option<SnapshotEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<SnapshotEvent> {
        self.events.try_recv().ok()
    }

    /// Detaches from the store. Events already queued are discarded.
    pub fn cancel(&mut self) {
        self.events.close();
        while self.events.try_recv().is_ok() {}
    }
}

struct Watcher {
    query: LiveQuery,
    events: mpsc::UnboundedSender<SnapshotEvent>,
}

/// Registry of live query watchers shared by the store implementations.
#[derive(Default)]
pub(crate) struct WatcherSet {
    watchers: Vec<Watcher>,
}

impl WatcherSet {
    /// Registers a watcher and queues its initial snapshot.
    pub(crate) fn register(&mut self, query: LiveQuery, initial: Snapshot) -> SnapshotStream {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        // The receiver is alive here, so the initial send cannot fail.
        let _ = events_tx.send(SnapshotEvent::Snapshot(initial));
        self.watchers.push(Watcher {
            query: query.clone(),
            events: events_tx,
        });
        SnapshotStream::new(query, events_rx)
    }

    /// Distinct live queries that still have an attached receiver.
    pub(crate) fn active_queries(&mut self, collection: &str) -> Vec<LiveQuery> {
        self.prune();
        let mut queries: Vec<LiveQuery> = Vec::new();
        for watcher in &self.watchers {
            if watcher.query.collection == collection && !queries.contains(&watcher.query) {
                queries.push(watcher.query.clone());
            }
        }
        queries
    }

    pub(crate) fn publish(&mut self, query: &LiveQuery, snapshot: &Snapshot) {
        for watcher in self.watchers.iter().filter(|watcher| &watcher.query == query) {
            let _ = watcher
                .events
                .send(SnapshotEvent::Snapshot(snapshot.clone()));
        }
        self.prune();
    }

    /// Reports a failure to the watchers of `query` only.
    pub(crate) fn publish_failure(&mut self, query: &LiveQuery, failure: &StreamFailure) {
        for watcher in self.watchers.iter().filter(|watcher| &watcher.query == query) {
            let _ = watcher.events.send(SnapshotEvent::Error(failure.clone()));
        }
        self.prune();
    }

    /// Reports a failure once to every watcher of `collection`, whatever its query.
    pub(crate) fn broadcast_failure(&mut self, collection: &str, failure: &StreamFailure) {
        for watcher in self
            .watchers
            .iter()
            .filter(|watcher| watcher.query.collection == collection)
        {
            let _ = watcher.events.send(SnapshotEvent::Error(failure.clone()));
        }
        self.prune();
    }

    pub(crate) fn len(&mut self) -> usize {
        self.prune();
        self.watchers.len()
    }

    fn prune(&mut self) {
        let before = self.watchers.len();
        self.watchers.retain(|watcher| !watcher.events.is_closed());
        let removed = before - self.watchers.len();
        if removed > 0 {
            tracing::debug!(removed, "pruned detached live query watchers");
        }
    }
}
