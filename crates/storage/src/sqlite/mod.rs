use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use snafu::ResultExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use tokio::sync::Mutex;

use super::error::{
    CreateSqliteDirectorySnafu, DecodeFieldsSnafu, EncodeFieldsSnafu, SqliteConnectOptionsSnafu,
    SqliteConnectSnafu, SqliteMigrateSnafu, SqlitePragmaSnafu, SqliteQuerySnafu, StorageResult,
};
use super::ids::DocumentId;
use super::stream::{SnapshotStream, WatcherSet};
use super::types::{Document, DocumentFields, LiveQuery, NewDocument, Snapshot, StreamFailure};
use super::{BoxFuture, Clock, DocumentStore};

/// SQLite-backed document store with in-process live queries.
///
/// Watchers only see writes made through this instance (or its clones).
#[derive(Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
    database_url: String,
    // Held across reload+publish so a watcher never receives an older snapshot after a newer one.
    watchers: Arc<Mutex<WatcherSet>>,
    clock: Clock,
}

impl SqliteDocumentStore {
    pub async fn open(database_location: &str) -> StorageResult<Self> {
        ensure_database_directory(database_location)?;

        let database_url = normalize_database_url(database_location);
        let connect_options = SqliteConnectOptions::from_str(&database_url)
            .context(SqliteConnectOptionsSnafu {
                stage: "sqlite-open-parse-url",
                database_url: database_url.clone(),
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(5_000));

        // One connection keeps `sqlite::memory:` databases shared across calls.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options)
            .await
            .context(SqliteConnectSnafu {
                stage: "sqlite-open-connect",
                database_url: database_url.clone(),
            })?;

        sqlx::query("PRAGMA busy_timeout = 5000;")
            .execute(&pool)
            .await
            .context(SqlitePragmaSnafu {
                stage: "sqlite-open-pragma-busy-timeout",
                pragma: "busy_timeout",
            })?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context(SqliteMigrateSnafu {
                stage: "sqlite-open-migrate",
            })?;

        tracing::info!(%database_url, "opened sqlite document store");
        Ok(Self {
            pool,
            database_url,
            watchers: Arc::new(Mutex::new(WatcherSet::default())),
            clock: Arc::new(Utc::now),
        })
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    async fn fan_out(&self, collection: &str) {
        let mut watchers = self.watchers.lock().await;
        for query in watchers.active_queries(collection) {
            match load_snapshot(&self.pool, &query).await {
                Ok(snapshot) => {
                    tracing::debug!(
                        collection,
                        documents = snapshot.documents.len(),
                        "publishing sqlite snapshot"
                    );
                    watchers.publish(&query, &snapshot);
                }
                Err(error) => {
                    tracing::warn!(collection, %error, "failed to reload live query");
                    watchers.publish_failure(
                        &query,
                        &StreamFailure {
                            stage: "sqlite-fan-out-reload",
                            details: error.to_string(),
                        },
                    );
                }
            }
        }
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn insert<'a>(
        &'a self,
        collection: &'a str,
        document: NewDocument,
    ) -> BoxFuture<'a, StorageResult<DocumentId>> {
        Box::pin(async move {
            let now = (self.clock)();
            let fields = document.resolve(now);
            let fields_json = serde_json::to_string(&fields).context(EncodeFieldsSnafu {
                stage: "document-insert-encode",
            })?;
            let id = DocumentId::new_v7();

            sqlx::query(
                "INSERT INTO documents (id, collection, fields_json, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(id.to_string())
            .bind(collection)
            .bind(fields_json)
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await
            .context(SqliteQuerySnafu {
                stage: "document-insert",
            })?;

            // The write is committed; reload failures go to watchers, not to the writer.
            self.fan_out(collection).await;
            Ok(id)
        })
    }

    fn watch<'a>(&'a self, query: LiveQuery) -> BoxFuture<'a, StorageResult<SnapshotStream>> {
        Box::pin(async move {
            let mut watchers = self.watchers.lock().await;
            let initial = load_snapshot(&self.pool, &query).await?;
            Ok(watchers.register(query, initial))
        })
    }
}

#[derive(Debug, FromRow)]
struct DocumentRow {
    id: String,
    fields_json: String,
}

async fn load_snapshot(pool: &SqlitePool, query: &LiveQuery) -> StorageResult<Snapshot> {
    let rows = sqlx::query_as::<_, DocumentRow>(
        "SELECT id, fields_json FROM documents WHERE collection = ? ORDER BY seq ASC",
    )
    .bind(&query.collection)
    .fetch_all(pool)
    .await
    .context(SqliteQuerySnafu {
        stage: "snapshot-load-query",
    })?;

    // Rows written by other clients may not decode; they are left out of the snapshot.
    let mut documents = rows
        .into_iter()
        .filter_map(|row| {
            let id = row.id.clone();
            match document_row_to_document(row) {
                Ok(document) => Some(document),
                Err(error) => {
                    tracing::warn!(%id, %error, "skipping undecodable document row");
                    None
                }
            }
        })
        .collect::<Vec<_>>();
    query.order(&mut documents);

    Ok(Snapshot {
        collection: query.collection.clone(),
        documents,
    })
}

fn document_row_to_document(row: DocumentRow) -> StorageResult<Document> {
    let fields: DocumentFields =
        serde_json::from_str(&row.fields_json).context(DecodeFieldsSnafu {
            stage: "document-row-decode",
            id: row.id.clone(),
        })?;
    Ok(Document::new(DocumentId::parse(&row.id)?, fields))
}

fn ensure_database_directory(database_location: &str) -> StorageResult<()> {
    if database_location.starts_with("sqlite:") || database_location == ":memory:" {
        return Ok(());
    }

    let path = Path::new(database_location);
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context(CreateSqliteDirectorySnafu {
            stage: "sqlite-open-create-directory",
            path: parent.display().to_string(),
        })?;
    }

    Ok(())
}

fn normalize_database_url(database_location: &str) -> String {
    if database_location.starts_with("sqlite:") {
        return database_location.to_string();
    }

    if database_location == ":memory:" {
        return "sqlite::memory:".to_string();
    }

    format!("sqlite://{database_location}")
}
