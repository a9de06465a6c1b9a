use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{FixedOffset, Offset, Utc};
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use parley_feed::MESSAGES_COLLECTION;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const SETTINGS_DIRECTORY_NAME: &str = "parley";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "PARLEY_";
pub const DEFAULT_LOG_FILTER: &str = "info";

const MAX_UTC_OFFSET_MINUTES: i32 = 24 * 60 - 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_blob_directory")]
    pub blob_directory: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            blob_directory: default_blob_directory(),
            collection: default_collection(),
            log_filter: default_log_filter(),
            utc_offset_minutes: 0,
        }
    }
}

impl Settings {
    pub fn normalized(mut self) -> Self {
        if self.database_path.as_os_str().is_empty() {
            self.database_path = default_database_path();
        }
        if self.blob_directory.as_os_str().is_empty() {
            self.blob_directory = default_blob_directory();
        }
        self.collection = match self.collection.trim() {
            "" => default_collection(),
            collection => collection.to_string(),
        };
        self.log_filter = match self.log_filter.trim() {
            "" => default_log_filter(),
            filter => filter.to_string(),
        };
        self.utc_offset_minutes = self
            .utc_offset_minutes
            .clamp(-MAX_UTC_OFFSET_MINUTES, MAX_UTC_OFFSET_MINUTES);
        self
    }

    /// Zone used for message time labels.
    pub fn time_zone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix())
    }
}

/// Where the active settings came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsOrigin {
    Defaults,
    File,
    Fallback { error: String },
}

pub struct SettingsStore {
    settings: Arc<ArcSwap<Settings>>,
    config_path: PathBuf,
    origin: SettingsOrigin,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".parley"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let (settings, origin) = Self::load_from_disk(&config_path);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
            origin,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn settings(&self) -> Arc<Settings> {
        self.settings.load_full()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn origin(&self) -> &SettingsOrigin {
        &self.origin
    }

    /// Logs how settings were resolved. Loading happens before the subscriber exists.
    pub fn report_origin(&self) {
        match self.origin() {
            SettingsOrigin::Defaults => {
                tracing::info!("settings file not found at {:?}, using defaults", self.config_path)
            }
            SettingsOrigin::File => {
                tracing::info!("loaded settings from {:?}", self.config_path)
            }
            SettingsOrigin::Fallback { error } => tracing::warn!(
                "failed to parse settings from {:?}: {}. using defaults",
                self.config_path,
                error
            ),
        }
    }

    pub fn update(&self, settings: Settings) -> Result<(), SettingsError> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    fn load_from_disk(path: &Path) -> (Settings, SettingsOrigin) {
        let origin = if path.exists() {
            SettingsOrigin::File
        } else {
            SettingsOrigin::Defaults
        };

        // A missing JSON file contributes nothing, so the environment still applies.
        let figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Json::file(path))
            .merge(Env::prefixed(ENV_PREFIX));

        match figment.extract::<Settings>() {
            Ok(settings) => (settings.normalized(), origin),
            Err(error) => (
                Settings::default(),
                SettingsOrigin::Fallback {
                    error: error.to_string(),
                },
            ),
        }
    }

    fn persist(&self, settings: &Settings) -> Result<(), SettingsError> {
        let path = &self.config_path;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context(WriteSettingsSnafu {
                stage: "settings-create-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(EncodeSettingsSnafu {
            stage: "settings-encode-json",
        })?;

        // Written next to the target and renamed, so readers never see a partial file.
        let staged = path.with_extension("json.tmp");
        std::fs::write(&staged, content)
            .and_then(|()| std::fs::rename(&staged, path))
            .context(WriteSettingsSnafu {
                stage: "settings-replace-file",
                path: path.clone(),
            })?;

        tracing::info!(path = %path.display(), "saved settings");
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to write settings at {path:?} on `{stage}`: {source}"))]
    WriteSettings {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to encode settings on `{stage}`: {source}"))]
    EncodeSettings {
        stage: &'static str,
        source: serde_json::Error,
    },
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
        .unwrap_or_else(|| PathBuf::from(".parley"))
}

fn default_database_path() -> PathBuf {
    data_dir().join("parley.db")
}

fn default_blob_directory() -> PathBuf {
    data_dir().join("blobs")
}

fn default_collection() -> String {
    MESSAGES_COLLECTION.to_string()
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let workspace = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(workspace.path().join("settings.json"));

        assert_eq!(store.origin(), &SettingsOrigin::Defaults);
        assert_eq!(store.settings().collection, "messages");
        assert_eq!(store.settings().log_filter, "info");
    }

    #[test]
    fn partial_file_keeps_defaults_for_absent_fields() {
        let workspace = tempfile::tempdir().unwrap();
        let path = workspace.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{ "collection": "  lobby  ", "utc_offset_minutes": 120 }"#,
        )
        .unwrap();

        let store = SettingsStore::new(path);
        let settings = store.settings();
        assert_eq!(store.origin(), &SettingsOrigin::File);
        assert_eq!(settings.collection, "lobby");
        assert_eq!(settings.utc_offset_minutes, 120);
        assert_eq!(settings.database_path, default_database_path());
        assert_eq!(settings.time_zone(), FixedOffset::east_opt(7200).unwrap());
    }

    #[test]
    fn unparsable_file_uses_defaults() {
        let workspace = tempfile::tempdir().unwrap();
        let path = workspace.path().join("settings.json");
        std::fs::write(&path, r#"{ "utc_offset_minutes": "noon" }"#).unwrap();

        let store = SettingsStore::new(path);
        assert!(matches!(store.origin(), SettingsOrigin::Fallback { .. }));
        assert_eq!(*store.settings(), Settings::default());
    }

    #[test]
    fn normalization_restores_blank_values_and_clamps_offset() {
        let settings = Settings {
            database_path: PathBuf::new(),
            collection: " ".to_string(),
            log_filter: String::new(),
            utc_offset_minutes: 100_000,
            ..Settings::default()
        }
        .normalized();

        assert_eq!(settings.database_path, default_database_path());
        assert_eq!(settings.collection, "messages");
        assert_eq!(settings.log_filter, "info");
        assert_eq!(settings.utc_offset_minutes, MAX_UTC_OFFSET_MINUTES);
    }

    #[test]
    fn update_persists_normalized_settings() {
        let workspace = tempfile::tempdir().unwrap();
        let path = workspace.path().join("nested").join("settings.json");
        let store = SettingsStore::new(path.clone());

        store
            .update(Settings {
                collection: " team ".to_string(),
                ..Settings::default()
            })
            .unwrap();

        assert_eq!(store.settings().collection, "team");
        let reloaded = SettingsStore::new(path);
        assert_eq!(reloaded.settings().collection, "team");
    }

    #[test]
    fn update_reports_unwritable_location_and_keeps_current_settings() {
        let workspace = tempfile::tempdir().unwrap();
        let blocker = workspace.path().join("not-a-directory");
        std::fs::write(&blocker, b"file").unwrap();
        let store = SettingsStore::new(blocker.join("settings.json"));

        let error = store
            .update(Settings {
                collection: "team".to_string(),
                ..Settings::default()
            })
            .unwrap_err();

        match error {
            SettingsError::WriteSettings { stage, .. } => {
                assert_eq!(stage, "settings-create-directory")
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.settings().collection, "messages");
    }
}
