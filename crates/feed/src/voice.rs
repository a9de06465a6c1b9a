use std::path::Path;
use std::sync::Arc;

use parley_storage::{BlobStore, DocumentId};
use snafu::ResultExt;
use url::Url;
use uuid::Uuid;

use crate::error::{FeedResult, VoiceUploadSnafu};
use crate::feed::MessageFeed;

/// Blob-store prefix for recorded voice notes.
pub const VOICE_NOTES_PREFIX: &str = "voice_notes";
const VOICE_NOTE_EXTENSION: &str = "m4a";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentVoiceNote {
    pub id: DocumentId,
    pub object_path: String,
    pub voice_url: Url,
}

/// Uploads local recordings and posts them to a feed as voice messages.
#[derive(Clone)]
pub struct VoiceNoteSender {
    blobs: Arc<dyn BlobStore>,
    feed: MessageFeed,
}

impl VoiceNoteSender {
    pub fn new(blobs: Arc<dyn BlobStore>, feed: MessageFeed) -> Self {
        Self { blobs, feed }
    }

    pub fn object_path_for(note: Uuid) -> String {
        format!("{VOICE_NOTES_PREFIX}/{note}.{VOICE_NOTE_EXTENSION}")
    }

    /// Upload, resolve the download locator, then submit. Stops at the first failure.
    pub async fn send(&self, recording: &Path) -> FeedResult<SentVoiceNote> {
        let object_path = Self::object_path_for(Uuid::new_v4());

        let locator = self
            .blobs
            .upload_file(recording, &object_path)
            .await
            .context(VoiceUploadSnafu {
                stage: "voice-note-upload",
                object_path: object_path.clone(),
            })?;
        let voice_url = self
            .blobs
            .download_url(&locator.object_path)
            .await
            .context(VoiceUploadSnafu {
                stage: "voice-note-download-url",
                object_path: object_path.clone(),
            })?;

        let id = self.feed.submit_voice(&voice_url).await?;
        tracing::info!(%id, %object_path, size_bytes = locator.size_bytes, "sent voice note");
        Ok(SentVoiceNote {
            id,
            object_path,
            voice_url,
        })
    }
}
