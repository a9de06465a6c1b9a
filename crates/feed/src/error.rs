use parley_storage::StorageError;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum FeedError {
    #[snafu(display("failed to write message to '{collection}' on `{stage}`: {source}"))]
    StoreWrite {
        stage: &'static str,
        collection: String,
        source: StorageError,
    },
    #[snafu(display("message stream failed on `{stage}`: {details}"))]
    StoreStream {
        stage: &'static str,
        details: String,
    },
    #[snafu(display("failed to subscribe to '{collection}' on `{stage}`: {source}"))]
    Subscribe {
        stage: &'static str,
        collection: String,
        source: StorageError,
    },
    #[snafu(display("failed to upload voice note '{object_path}' on `{stage}`: {source}"))]
    VoiceUpload {
        stage: &'static str,
        object_path: String,
        source: StorageError,
    },
}

pub type FeedResult<T> = Result<T, FeedError>;
