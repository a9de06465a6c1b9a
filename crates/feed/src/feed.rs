use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwap;
use parley_storage::{DocumentId, DocumentStore, LiveQuery, SnapshotEvent, SnapshotStream};
use snafu::ResultExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use url::Url;

use crate::error::{FeedError, FeedResult, StoreWriteSnafu, SubscribeSnafu};
use crate::message::{
    FIELD_TIMESTAMP, MESSAGES_COLLECTION, Message, messages_from_snapshot, text_document,
    voice_document,
};

/// Consumer of published feed state.
///
/// Both callbacks run on the subscription task, one snapshot at a time.
pub trait FeedListener: Send + 'static {
    /// Receives the complete validated sequence, ascending by timestamp.
    fn on_update(&mut self, messages: &[Message]);

    fn on_error(&mut self, error: &FeedError);
}

/// Adapts a pair of closures to [`FeedListener`].
pub struct FnListener<U, E> {
    on_update: U,
    on_error: E,
}

impl<U, E> FnListener<U, E>
where
    U: FnMut(&[Message]) + Send + 'static,
    E: FnMut(&FeedError) + Send + 'static,
{
    pub fn new(on_update: U, on_error: E) -> Self {
        Self {
            on_update,
            on_error,
        }
    }
}

impl<U, E> FeedListener for FnListener<U, E>
where
    U: FnMut(&[Message]) + Send + 'static,
    E: FnMut(&FeedError) + Send + 'static,
{
    fn on_update(&mut self, messages: &[Message]) {
        (self.on_update)(messages)
    }

    fn on_error(&mut self, error: &FeedError) {
        (self.on_error)(error)
    }
}

/// Feed output mapped onto a channel, for consumers that poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    Updated(Vec<Message>),
    Failed(String),
}

struct ChannelListener {
    events: mpsc::UnboundedSender<FeedEvent>,
}

impl FeedListener for ChannelListener {
    fn on_update(&mut self, messages: &[Message]) {
        let _ = self.events.send(FeedEvent::Updated(messages.to_vec()));
    }

    fn on_error(&mut self, error: &FeedError) {
        let _ = self.events.send(FeedEvent::Failed(error.to_string()));
    }
}

/// Result of a submit call that may decline to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Skipped,
    Submitted(DocumentId),
}

/// Ordered, validated view over the message collection of a document store.
///
/// Writes are fire-and-forget: a submitted message shows up only once the store's
/// live query delivers it back with a server timestamp.
#[derive(Clone)]
pub struct MessageFeed {
    store: Arc<dyn DocumentStore>,
    collection: String,
    latest: Arc<ArcSwap<Vec<Message>>>,
}

impl MessageFeed {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_collection(store, MESSAGES_COLLECTION)
    }

    pub fn with_collection(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
            latest: Arc::new(ArcSwap::from_pointee(Vec::new())),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Last sequence published by any subscription; kept across stream errors.
    pub fn latest(&self) -> Arc<Vec<Message>> {
        self.latest.load_full()
    }

    /// Attaches `listener` to the live query. Dropping the handle cancels it.
    pub async fn subscribe<L: FeedListener>(&self, listener: L) -> FeedResult<FeedSubscription> {
        let query = LiveQuery::new(self.collection.clone(), FIELD_TIMESTAMP);
        let stream = self.store.watch(query).await.context(SubscribeSnafu {
            stage: "feed-subscribe-watch",
            collection: self.collection.clone(),
        })?;

        let cancelled = Arc::new(AtomicBool::new(false));
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let worker = tokio::spawn(run_subscription(
            stream,
            listener,
            cancelled.clone(),
            cancel_rx,
            self.latest.clone(),
        ));

        tracing::info!(collection = %self.collection, "subscribed to message feed");
        Ok(FeedSubscription {
            cancelled,
            cancel_tx: Some(cancel_tx),
            worker: Some(worker),
        })
    }

    pub async fn subscribe_with<U, E>(
        &self,
        on_update: U,
        on_error: E,
    ) -> FeedResult<FeedSubscription>
    where
        U: FnMut(&[Message]) + Send + 'static,
        E: FnMut(&FeedError) + Send + 'static,
    {
        self.subscribe(FnListener::new(on_update, on_error)).await
    }

    pub async fn subscribe_channel(
        &self,
    ) -> FeedResult<(FeedSubscription, mpsc::UnboundedReceiver<FeedEvent>)> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let subscription = self
            .subscribe(ChannelListener { events: events_tx })
            .await?;
        Ok((subscription, events_rx))
    }

    /// Inserts a text message. Blank input (after trimming) writes nothing.
    ///
    /// The text is stored as given; trimming only decides whether to send.
    pub async fn submit_text(&self, text: &str) -> FeedResult<SubmitOutcome> {
        if text.trim().is_empty() {
            tracing::debug!("skipping blank text message");
            return Ok(SubmitOutcome::Skipped);
        }

        let id = self
            .store
            .insert(&self.collection, text_document(text))
            .await
            .context(StoreWriteSnafu {
                stage: "feed-submit-text",
                collection: self.collection.clone(),
            })?;
        tracing::debug!(%id, "submitted text message");
        Ok(SubmitOutcome::Submitted(id))
    }

    /// Inserts a voice message pointing at an already uploaded, downloadable resource.
    pub async fn submit_voice(&self, reference: &Url) -> FeedResult<DocumentId> {
        let id = self
            .store
            .insert(&self.collection, voice_document(reference))
            .await
            .context(StoreWriteSnafu {
                stage: "feed-submit-voice",
                collection: self.collection.clone(),
            })?;
        tracing::debug!(%id, voice_url = %reference, "submitted voice message");
        Ok(id)
    }
}

/// Handle for one feed subscription.
pub struct FeedSubscription {
    cancelled: Arc<AtomicBool>,
    cancel_tx: Option<oneshot::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl FeedSubscription {
    /// Stops further deliveries. Returns false if already cancelled.
    ///
    /// A listener callback that is already running when this is called still completes;
    /// none starts afterwards.
    pub fn cancel(&mut self) -> bool {
        let first = !self.cancelled.swap(true, Ordering::AcqRel);
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
        first
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Waits until the subscription task has exited.
    pub async fn finished(&mut self) {
        if let Some(worker) = self.worker.take()
            && let Err(error) = worker.await
        {
            tracing::warn!(%error, "feed subscription task ended abnormally");
        }
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn run_subscription<L: FeedListener>(
    mut stream: SnapshotStream,
    mut listener: L,
    cancelled: Arc<AtomicBool>,
    mut cancel_rx: oneshot::Receiver<()>,
    latest: Arc<ArcSwap<Vec<Message>>>,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = &mut cancel_rx => break,
            event = stream.recv() => event,
        };
        let Some(event) = event else {
            tracing::info!(
                collection = %stream.query().collection,
                "store closed the message stream"
            );
            break;
        };
        if !handle_event(event, &mut listener, &cancelled, &latest) {
            break;
        }
    }

    stream.cancel();
}

/// Applies one stream event. Returns false once the subscription is cancelled.
///
/// The flag is read after validation, immediately before the listener call.
fn handle_event<L: FeedListener>(
    event: SnapshotEvent,
    listener: &mut L,
    cancelled: &AtomicBool,
    latest: &ArcSwap<Vec<Message>>,
) -> bool {
    match event {
        SnapshotEvent::Snapshot(snapshot) => {
            let messages = Arc::new(messages_from_snapshot(&snapshot));
            if cancelled.load(Ordering::Acquire) {
                return false;
            }
            latest.store(messages.clone());
            listener.on_update(&messages);
        }
        SnapshotEvent::Error(failure) => {
            tracing::warn!(
                stage = failure.stage,
                details = %failure.details,
                "message stream reported an error"
            );
            if cancelled.load(Ordering::Acquire) {
                return false;
            }
            listener.on_error(&FeedError::StoreStream {
                stage: failure.stage,
                details: failure.details,
            });
        }
    }
    true
}
