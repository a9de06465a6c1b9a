use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use super::error::{StorageResult, WriteRejectedSnafu};
use super::ids::DocumentId;
use super::stream::{SnapshotStream, WatcherSet};
use super::types::{Document, DocumentFields, LiveQuery, NewDocument, Snapshot, StreamFailure};
use super::{BoxFuture, Clock, DocumentStore};

#[derive(Default)]
struct MemoryState {
    // Insertion order per collection; snapshots sort a copy.
    collections: HashMap<String, Vec<Document>>,
    watchers: WatcherSet,
    insert_failure: Option<String>,
}

impl MemoryState {
    fn snapshot(&self, query: &LiveQuery) -> Snapshot {
        let mut documents = self
            .collections
            .get(&query.collection)
            .cloned()
            .unwrap_or_default();
        query.order(&mut documents);
        Snapshot {
            collection: query.collection.clone(),
            documents,
        }
    }

    fn store(&mut self, collection: &str, document: Document) {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .push(document);

        for query in self.watchers.active_queries(collection) {
            let snapshot = self.snapshot(&query);
            self.watchers.publish(&query, &snapshot);
        }
    }
}

/// In-process document store with live queries.
///
/// Every mutation and its fan-out happen under one lock, so each watcher observes
/// snapshots in mutation order.
#[derive(Clone)]
pub struct MemoryDocumentStore {
    state: Arc<Mutex<MemoryState>>,
    clock: Clock,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(Utc::now))
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores raw fields as written by some other client, bypassing sentinel resolution.
    pub fn put_document(&self, collection: &str, fields: DocumentFields) -> DocumentId {
        let id = DocumentId::new_v7();
        self.lock().store(collection, Document::new(id, fields));
        id
    }

    /// Documents of `collection` in insertion order.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.lock()
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Makes every following insert fail with `reason` until cleared.
    pub fn fail_inserts(&self, reason: impl Into<String>) {
        self.lock().insert_failure = Some(reason.into());
    }

    pub fn clear_insert_failure(&self) {
        self.lock().insert_failure = None;
    }

    /// Reports a delivery failure to every watcher of `collection`.
    pub fn broadcast_error(&self, collection: &str, details: impl Into<String>) {
        let failure = StreamFailure {
            stage: "memory-store-broadcast-error",
            details: details.into(),
        };
        self.lock().watchers.broadcast_failure(collection, &failure);
    }

    pub fn watcher_count(&self) -> usize {
        self.lock().watchers.len()
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn insert<'a>(
        &'a self,
        collection: &'a str,
        document: NewDocument,
    ) -> BoxFuture<'a, StorageResult<DocumentId>> {
        Box::pin(async move {
            let mut state = self.lock();
            if let Some(reason) = state.insert_failure.clone() {
                return WriteRejectedSnafu {
                    stage: "memory-store-insert",
                    reason,
                }
                .fail();
            }

            let id = DocumentId::new_v7();
            let fields = document.resolve((self.clock)());
            state.store(collection, Document::new(id, fields));
            tracing::debug!(%id, collection, "memory store inserted document");
            Ok(id)
        })
    }

    fn watch<'a>(&'a self, query: LiveQuery) -> BoxFuture<'a, StorageResult<SnapshotStream>> {
        Box::pin(async move {
            let mut state = self.lock();
            let initial = state.snapshot(&query);
            Ok(state.watchers.register(query, initial))
        })
    }
}
