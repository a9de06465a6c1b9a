use std::path::{Component, Path, PathBuf};

use snafu::{OptionExt, ResultExt, ensure};
use url::Url;

use super::error::{
    BlobIoSnafu, BlobLocatorSnafu, BlobNotFoundSnafu, InvalidObjectPathSnafu, StorageResult,
};
use super::types::BlobLocator;
use super::{BlobStore, BoxFuture};

/// Blob store that keeps objects as files under a root directory.
///
/// Download locators are `file://` URLs, which stay valid for as long as the root does.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_file(&self, object_path: &str, stage: &'static str) -> StorageResult<PathBuf> {
        ensure!(
            !object_path.trim().is_empty(),
            InvalidObjectPathSnafu {
                stage,
                object_path,
                details: "object path is empty",
            }
        );

        let relative = Path::new(object_path);
        for component in relative.components() {
            ensure!(
                matches!(component, Component::Normal(_)),
                InvalidObjectPathSnafu {
                    stage,
                    object_path,
                    details: "object path must be relative without `.` or `..` segments",
                }
            );
        }

        Ok(self.root.join(relative))
    }
}

impl BlobStore for FsBlobStore {
    fn upload_file<'a>(
        &'a self,
        local_path: &'a Path,
        object_path: &'a str,
    ) -> BoxFuture<'a, StorageResult<BlobLocator>> {
        Box::pin(async move {
            let target = self.object_file(object_path, "blob-upload-resolve")?;
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context(BlobIoSnafu {
                        stage: "blob-upload-create-directory",
                        path: parent.display().to_string(),
                    })?;
            }

            let size_bytes = tokio::fs::copy(local_path, &target)
                .await
                .context(BlobIoSnafu {
                    stage: "blob-upload-copy",
                    path: local_path.display().to_string(),
                })?;

            tracing::info!(object_path, size_bytes, "uploaded blob");
            Ok(BlobLocator {
                object_path: object_path.to_string(),
                size_bytes,
            })
        })
    }

    fn download_url<'a>(&'a self, object_path: &'a str) -> BoxFuture<'a, StorageResult<Url>> {
        Box::pin(async move {
            let target = self.object_file(object_path, "blob-download-resolve")?;
            let exists = tokio::fs::try_exists(&target).await.context(BlobIoSnafu {
                stage: "blob-download-stat",
                path: target.display().to_string(),
            })?;
            ensure!(
                exists,
                BlobNotFoundSnafu {
                    stage: "blob-download-missing",
                    object_path,
                }
            );

            let absolute = std::path::absolute(&target).context(BlobIoSnafu {
                stage: "blob-download-absolute",
                path: target.display().to_string(),
            })?;
            Url::from_file_path(&absolute).ok().context(BlobLocatorSnafu {
                stage: "blob-download-url",
                path: absolute.display().to_string(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;

    #[tokio::test]
    async fn uploaded_file_resolves_to_a_file_url_with_same_bytes() {
        let workspace = tempfile::tempdir().unwrap();
        let recording = workspace.path().join("recording.m4a");
        tokio::fs::write(&recording, b"voice-bytes").await.unwrap();

        let store = FsBlobStore::new(workspace.path().join("blobs"));
        let locator = store
            .upload_file(&recording, "voice_notes/one.m4a")
            .await
            .unwrap();
        assert_eq!(locator.size_bytes, 11);

        let url = store.download_url(&locator.object_path).await.unwrap();
        assert_eq!(url.scheme(), "file");
        let stored = tokio::fs::read(url.to_file_path().unwrap()).await.unwrap();
        assert_eq!(stored, b"voice-bytes");
    }

    #[tokio::test]
    async fn escaping_object_paths_are_rejected() {
        let workspace = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(workspace.path());

        for object_path in ["../outside.m4a", "/etc/passwd", "", "./voice.m4a"] {
            let error = store.download_url(object_path).await.unwrap_err();
            assert!(
                matches!(error, StorageError::InvalidObjectPath { .. }),
                "{object_path}: {error}"
            );
        }
    }

    #[tokio::test]
    async fn missing_objects_have_no_download_url() {
        let workspace = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(workspace.path());

        let error = store.download_url("voice_notes/none.m4a").await.unwrap_err();
        assert!(matches!(error, StorageError::BlobNotFound { .. }));
    }

    #[tokio::test]
    async fn upload_of_missing_local_file_reports_io_error() {
        let workspace = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(workspace.path().join("blobs"));

        let error = store
            .upload_file(&workspace.path().join("absent.m4a"), "voice_notes/x.m4a")
            .await
            .unwrap_err();
        assert!(matches!(error, StorageError::BlobIo { .. }));
    }
}
