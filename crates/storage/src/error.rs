use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    #[snafu(display("storage id '{raw}' is invalid for {id_type}"))]
    InvalidId {
        stage: &'static str,
        id_type: &'static str,
        raw: String,
        source: uuid::Error,
    },
    #[snafu(display("document write rejected by store: {reason}"))]
    WriteRejected {
        stage: &'static str,
        reason: String,
    },
    #[snafu(display("failed to encode document fields on `{stage}`: {source}"))]
    EncodeFields {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to decode document '{id}' fields on `{stage}`: {source}"))]
    DecodeFields {
        stage: &'static str,
        id: String,
        source: serde_json::Error,
    },
    #[snafu(display("failed to create sqlite directory at {path}"))]
    CreateSqliteDirectory {
        stage: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to parse sqlite connection URL '{database_url}'"))]
    SqliteConnectOptions {
        stage: &'static str,
        database_url: String,
        source: sqlx::Error,
    },
    #[snafu(display("failed to connect sqlite database '{database_url}'"))]
    SqliteConnect {
        stage: &'static str,
        database_url: String,
        source: sqlx::Error,
    },
    #[snafu(display("failed to configure sqlite pragma '{pragma}'"))]
    SqlitePragma {
        stage: &'static str,
        pragma: &'static str,
        source: sqlx::Error,
    },
    #[snafu(display("failed to run sqlite migrations"))]
    SqliteMigrate {
        stage: &'static str,
        source: sqlx::migrate::MigrateError,
    },
    #[snafu(display("sqlite query failed at {stage}: {source}"))]
    SqliteQuery {
        stage: &'static str,
        source: sqlx::Error,
    },
    #[snafu(display("blob object path '{object_path}' is invalid: {details}"))]
    InvalidObjectPath {
        stage: &'static str,
        object_path: String,
        details: &'static str,
    },
    #[snafu(display("blob object '{object_path}' was not found"))]
    BlobNotFound {
        stage: &'static str,
        object_path: String,
    },
    #[snafu(display("blob i/o failed at {path} on `{stage}`: {source}"))]
    BlobIo {
        stage: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("blob path {path} cannot be expressed as a download URL"))]
    BlobLocator { stage: &'static str, path: String },
}

pub type StorageResult<T> = Result<T, StorageError>;
