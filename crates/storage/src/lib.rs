pub mod blob;
pub mod error;
pub mod ids;
pub mod memory;
pub mod sqlite;
pub mod stream;
pub mod types;

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use url::Url;

pub use blob::FsBlobStore;
pub use error::{StorageError, StorageResult};
pub use ids::DocumentId;
pub use memory::MemoryDocumentStore;
pub use sqlite::SqliteDocumentStore;
pub use stream::SnapshotStream;
pub use types::{
    BlobLocator, Document, DocumentFields, FieldValue, LiveQuery, NewDocument, Snapshot,
    SnapshotEvent, StreamFailure, WriteValue,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Source of server timestamps.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Schema-less document store with ordered live queries.
pub trait DocumentStore: Send + Sync {
    /// Inserts a document, resolving server timestamp sentinels, and notifies watchers.
    fn insert<'a>(
        &'a self,
        collection: &'a str,
        document: NewDocument,
    ) -> BoxFuture<'a, StorageResult<DocumentId>>;

    /// Registers a live query. The stream starts with the current snapshot.
    fn watch<'a>(&'a self, query: LiveQuery) -> BoxFuture<'a, StorageResult<SnapshotStream>>;
}

/// Binary object storage returning durable download locators.
pub trait BlobStore: Send + Sync {
    fn upload_file<'a>(
        &'a self,
        local_path: &'a Path,
        object_path: &'a str,
    ) -> BoxFuture<'a, StorageResult<BlobLocator>>;

    fn download_url<'a>(&'a self, object_path: &'a str) -> BoxFuture<'a, StorageResult<Url>>;
}
