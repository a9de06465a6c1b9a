mod console;
mod settings;

use std::process::ExitCode;
use std::sync::Arc;

use parley_feed::{FeedError, FeedEvent, MessageFeed, SubmitOutcome, VoiceNoteSender};
use parley_storage::{FsBlobStore, SqliteDocumentStore, StorageError};
use snafu::{ResultExt, Snafu};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use console::{Command, FeedPrinter};
use settings::{DEFAULT_LOG_FILTER, Settings, SettingsStore};

#[derive(Debug, Snafu)]
enum AppError {
    #[snafu(display("failed to open message store on `{stage}`: {source}"))]
    OpenStore {
        stage: &'static str,
        source: StorageError,
    },
    #[snafu(display("failed to attach to message feed on `{stage}`: {source}"))]
    AttachFeed {
        stage: &'static str,
        source: FeedError,
    },
    #[snafu(display("failed to read terminal input on `{stage}`: {source}"))]
    ReadInput {
        stage: &'static str,
        source: std::io::Error,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let settings_store = SettingsStore::load();
    init_tracing(&settings_store.settings());
    settings_store.report_origin();

    match run(settings_store).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "parley stopped");
            eprintln!("parley: {error}");
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins over the configured filter.
fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(settings_store: SettingsStore) -> Result<(), AppError> {
    let settings = settings_store.settings();
    let database_location = settings.database_path.display().to_string();
    let documents = SqliteDocumentStore::open(&database_location)
        .await
        .context(OpenStoreSnafu {
            stage: "open-sqlite-document-store",
        })?;
    let blobs = FsBlobStore::new(settings.blob_directory.clone());

    let feed = MessageFeed::with_collection(Arc::new(documents), settings.collection.clone());
    let voice_notes = VoiceNoteSender::new(Arc::new(blobs), feed.clone());
    let (_subscription, mut events) = feed.subscribe_channel().await.context(AttachFeedSnafu {
        stage: "subscribe-message-feed",
    })?;

    tracing::info!(
        database = %database_location,
        settings = ?settings_store.config_path(),
        collection = %settings.collection,
        "parley ready; type a message, /voice <path>, /tz <minutes> or /quit"
    );

    let mut printer = FeedPrinter::new(settings.time_zone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(FeedEvent::Updated(messages)) => {
                    for line in printer.fresh_lines(&messages) {
                        println!("{line}");
                    }
                }
                Some(FeedEvent::Failed(details)) => {
                    eprintln!("feed error: {details}");
                }
                None => {
                    tracing::warn!("message feed closed");
                    break;
                }
            },
            line = lines.next_line() => {
                let Some(line) = line.context(ReadInputSnafu { stage: "read-stdin-line" })? else {
                    break;
                };
                match Command::parse(&line) {
                    Command::Quit => break,
                    Command::Text(text) => match feed.submit_text(&text).await {
                        Ok(SubmitOutcome::Submitted(id)) => tracing::debug!(%id, "message sent"),
                        Ok(SubmitOutcome::Skipped) => {}
                        Err(error) => eprintln!("send failed: {error}"),
                    },
                    Command::Voice(path) => {
                        if let Err(error) = voice_notes.send(&path).await {
                            eprintln!("voice note failed: {error}");
                        }
                    }
                    Command::Offset(minutes) => {
                        let updated = Settings {
                            utc_offset_minutes: minutes,
                            ..(*settings_store.settings()).clone()
                        };
                        if let Err(error) = settings_store.update(updated) {
                            eprintln!("could not save settings: {error}");
                        }
                        printer.set_time_zone(settings_store.settings().time_zone());
                    }
                    Command::Invalid(usage) => eprintln!("{usage}"),
                }
            }
        }
    }

    tracing::info!("parley shutting down");
    Ok(())
}
