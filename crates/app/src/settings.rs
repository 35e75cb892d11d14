use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_TYPING_IDLE_MS: u64 = 1_000;
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 32;
pub const DEFAULT_PREVIEW_MAX_CHARS: usize = souk_chat::DEFAULT_PREVIEW_MAX_CHARS;
pub const SETTINGS_DIRECTORY_NAME: &str = "souk";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "SOUK_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_typing_idle_ms")]
    pub typing_idle_ms: u64,
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,
    #[serde(default = "default_preview_max_chars")]
    pub preview_max_chars: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            typing_idle_ms: default_typing_idle_ms(),
            notification_capacity: default_notification_capacity(),
            preview_max_chars: default_preview_max_chars(),
        }
    }
}

impl ClientSettings {
    pub fn typing_idle(&self) -> Duration {
        Duration::from_millis(self.typing_idle_ms)
    }

    pub fn normalized(mut self) -> Self {
        self.api_base_url = self.api_base_url.trim().trim_end_matches('/').to_string();
        if self.api_base_url.is_empty() {
            self.api_base_url = default_api_base_url();
        }

        // A zero value would disable the feature outright; fall back instead.
        if self.typing_idle_ms == 0 {
            self.typing_idle_ms = DEFAULT_TYPING_IDLE_MS;
        }
        if self.notification_capacity == 0 {
            self.notification_capacity = DEFAULT_NOTIFICATION_CAPACITY;
        }
        if self.preview_max_chars == 0 {
            self.preview_max_chars = DEFAULT_PREVIEW_MAX_CHARS;
        }

        self
    }
}

pub struct SettingsStore {
    settings: Arc<ArcSwap<ClientSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".souk"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<ClientSettings> {
        self.settings.load_full()
    }

    /// Normalizes, writes, then publishes `settings`. Returns `false` when
    /// nothing changed and the file was left alone.
    pub fn update(&self, settings: ClientSettings) -> Result<bool, SettingsError> {
        let normalized = settings.normalized();
        if *self.settings.load_full() == normalized && self.config_path.exists() {
            tracing::debug!("settings unchanged, skipping write");
            return Ok(false);
        }

        write_settings_file(&self.config_path, &normalized)?;
        self.settings.store(Arc::new(normalized));
        Ok(true)
    }

    fn load_from_disk(path: &Path) -> ClientSettings {
        if !path.exists() {
            tracing::info!("settings file not found at {:?}, using defaults", path);
        }

        let figment = Figment::from(Serialized::defaults(ClientSettings::default()))
            .merge(Json::file(path))
            .merge(Env::prefixed(ENV_PREFIX));

        match figment.extract::<ClientSettings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to parse settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                ClientSettings::default()
            }
        }
    }
}

/// Sibling file a settings write is staged in before it replaces the real one.
fn staging_path(config_path: &Path) -> PathBuf {
    let file_name = config_path
        .file_name()
        .map_or_else(|| SETTINGS_FILE_NAME.into(), |name| name.to_string_lossy());
    config_path.with_file_name(format!(".{file_name}.pending"))
}

// Readers of `config_path` only ever see a complete file.
fn write_settings_file(
    config_path: &Path,
    settings: &ClientSettings,
) -> Result<(), SettingsError> {
    let mut document = serde_json::to_string_pretty(settings).context(EncodeSettingsSnafu {
        stage: "encode-client-settings",
    })?;
    document.push('\n');

    if let Some(settings_dir) = config_path.parent() {
        std::fs::create_dir_all(settings_dir).context(PrepareSettingsDirSnafu {
            stage: "prepare-settings-dir",
            settings_dir: settings_dir.to_path_buf(),
        })?;
    }

    let staged = staging_path(config_path);
    std::fs::write(&staged, document).context(StageSettingsSnafu {
        stage: "stage-settings-file",
        staged: staged.clone(),
    })?;

    if let Err(source) = std::fs::rename(&staged, config_path) {
        if let Err(cleanup) = std::fs::remove_file(&staged) {
            tracing::debug!("could not remove staged settings {:?}: {}", staged, cleanup);
        }
        return Err(source).context(CommitSettingsSnafu {
            stage: "commit-settings-file",
            config_path: config_path.to_path_buf(),
        });
    }

    tracing::info!("saved settings to {:?}", config_path);
    Ok(())
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("client settings could not be encoded on `{stage}`: {source}"))]
    EncodeSettings {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("settings dir {settings_dir:?} is not usable on `{stage}`: {source}"))]
    PrepareSettingsDir {
        stage: &'static str,
        settings_dir: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("could not stage settings in {staged:?} on `{stage}`: {source}"))]
    StageSettings {
        stage: &'static str,
        staged: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("staged settings could not replace {config_path:?} on `{stage}`: {source}"))]
    CommitSettings {
        stage: &'static str,
        config_path: PathBuf,
        source: std::io::Error,
    },
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_typing_idle_ms() -> u64 {
    DEFAULT_TYPING_IDLE_MS
}

fn default_notification_capacity() -> usize {
    DEFAULT_NOTIFICATION_CAPACITY
}

fn default_preview_max_chars() -> usize {
    DEFAULT_PREVIEW_MAX_CHARS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("souk-settings-{}", uuid::Uuid::now_v7()))
            .join(SETTINGS_FILE_NAME)
    }

    #[test]
    fn missing_file_yields_defaults() {
        let store = SettingsStore::new(scratch_path());
        let settings = store.settings();

        assert_eq!(settings.typing_idle(), Duration::from_millis(1_000));
        assert_eq!(settings.notification_capacity, 32);
        assert_eq!(settings.preview_max_chars, 80);
    }

    #[test]
    fn update_persists_normalized_settings_and_reloads() {
        let path = scratch_path();
        let store = SettingsStore::new(path.clone());
        store
            .update(ClientSettings {
                api_base_url: "  https://souk.example/api/ ".to_string(),
                typing_idle_ms: 0,
                notification_capacity: 4,
                preview_max_chars: 40,
            })
            .unwrap();

        assert!(!staging_path(&path).exists());
        assert!(!store.update((*store.settings()).clone()).unwrap());
        let reloaded = SettingsStore::new(path.clone()).settings();
        assert_eq!(reloaded.api_base_url, "https://souk.example/api");
        assert_eq!(reloaded.typing_idle_ms, DEFAULT_TYPING_IDLE_MS);
        assert_eq!(reloaded.notification_capacity, 4);
        assert_eq!(reloaded.preview_max_chars, 40);

        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let path = scratch_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{ "typing_idle_ms": 750 }"#).unwrap();

        let settings = SettingsStore::new(path.clone()).settings();
        assert_eq!(settings.typing_idle_ms, 750);
        assert_eq!(settings.api_base_url, DEFAULT_API_BASE_URL);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let path = scratch_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{ "typing_idle_ms": "soon" }"#).unwrap();

        assert_eq!(
            *SettingsStore::new(path.clone()).settings(),
            ClientSettings::default()
        );

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn failed_commit_leaves_no_staged_file() {
        let path = scratch_path();
        // A non-empty directory where the file belongs makes the rename fail.
        std::fs::create_dir_all(path.join("occupied")).unwrap();
        let store = SettingsStore::new(path.clone());

        let result = store.update(ClientSettings {
            notification_capacity: 8,
            ..ClientSettings::default()
        });

        assert!(matches!(result, Err(SettingsError::CommitSettings { .. })));
        assert!(!staging_path(&path).exists());
        assert_eq!(store.settings().notification_capacity, 32);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
