use directories::{ProjectDirs, UserDirs};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::{config_file_name, JSON_EXTENSION, TEXT_EXTENSION};
use crate::error::{Result, SessionError};
use crate::logger;
use crate::playback::{DEFAULT_PLAYER_COMMAND, DEFAULT_PROBE_COMMAND};

pub const CONFIG_DIR_NAME: &str = "SubjectiveCfg";
pub const MEDIA_DIR_NAME: &str = "SubjectiveMovies";
pub const LOGS_DIR_NAME: &str = "SubjectiveLogs";

/// Persisted preferences
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Continuous slider shows only its end labels
    pub no_ticks: bool,
    pub allow_duplicate_ids: bool,
    pub player_command: String,
    pub probe_command: String,
    pub data_root: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            no_ticks: false,
            allow_duplicate_ids: false,
            player_command: DEFAULT_PLAYER_COMMAND.to_string(),
            probe_command: DEFAULT_PROBE_COMMAND.to_string(),
            data_root: None,
        }
    }
}

impl Settings {
    /// Updates one preference by key, as typed on the command line.
    pub fn set(&mut self, key: &str, value: &str) -> std::result::Result<(), String> {
        match key {
            "no_ticks" => self.no_ticks = parse_flag(key, value)?,
            "allow_duplicate_ids" => self.allow_duplicate_ids = parse_flag(key, value)?,
            "player_command" => self.player_command = value.to_string(),
            "probe_command" => self.probe_command = value.to_string(),
            "data_root" => {
                self.data_root = (!value.is_empty()).then(|| PathBuf::from(value));
            }
            _ => return Err(format!("unknown setting \"{key}\"")),
        }
        Ok(())
    }

    pub fn data_root(&self) -> PathBuf {
        self.data_root.clone().unwrap_or_else(default_data_root)
    }
}

fn parse_flag(key: &str, value: &str) -> std::result::Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(format!("{key} expects true or false, got \"{value}\"")),
    }
}

/// Home directory, or the current one when there is none
pub fn default_data_root() -> PathBuf {
    UserDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

pub trait SettingsStore {
    fn load(&self) -> Settings;
    fn save(&self, settings: &Settings) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = if let Some(pd) = ProjectDirs::from("", "", "subjective") {
            pd.config_dir().join("settings.json")
        } else {
            PathBuf::from("subjective_settings.json")
        };
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileSettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self) -> Settings {
        let Ok(bytes) = fs::read(&self.path) else {
            return Settings::default();
        };
        match serde_json::from_slice::<Settings>(&bytes) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "ignoring unreadable settings");
                Settings::default()
            }
        }
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(settings)?;
        fs::write(&self.path, data)?;
        debug!(path = %self.path.display(), "settings saved");
        Ok(())
    }
}

/// The three folders a session works with, all under one root
#[derive(Debug, Clone, PartialEq)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join(CONFIG_DIR_NAME)
    }

    pub fn media_dir(&self) -> PathBuf {
        self.root.join(MEDIA_DIR_NAME)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(LOGS_DIR_NAME)
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.config_dir(), self.media_dir(), self.logs_dir()] {
            if !dir.is_dir() {
                fs::create_dir_all(&dir)?;
                debug!(dir = %dir.display(), "created folder");
            }
        }
        Ok(())
    }

    /// `subject_<id>.json` if present, otherwise `subject_<id>.cfg`.
    pub fn resolve_config(&self, participant_id: u32) -> Result<PathBuf> {
        let dir = self.config_dir();
        [JSON_EXTENSION, TEXT_EXTENSION]
            .iter()
            .map(|ext| dir.join(config_file_name(participant_id, ext)))
            .find(|path| path.is_file())
            .ok_or(SessionError::ConfigNotFound {
                id: participant_id,
                dir,
            })
    }

    /// Fails when a log for `participant_id` exists and reuse is not allowed.
    pub fn check_participant_id(&self, participant_id: u32, settings: &Settings) -> Result<()> {
        if !settings.allow_duplicate_ids && logger::id_exists(&self.logs_dir(), participant_id) {
            return Err(SessionError::ParticipantIdUsed(participant_id));
        }
        Ok(())
    }
}

impl From<&Settings> for StorageLayout {
    fn from(settings: &Settings) -> Self {
        Self::new(settings.data_root())
    }
}
