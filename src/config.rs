use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// File name looked up in the host's resource directory.
pub const SETTINGS_FILE_NAME: &str = "automidireset.toml";

/// How raw device-change signals are debounced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchedulerKind {
    /// Measured on the embedder's periodic tick.
    #[default]
    PollTick,
    /// Timed on a dedicated thread that calls back once settled.
    OneShot,
}

impl fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerKind::PollTick => write!(f, "poll-tick"),
            SchedulerKind::OneShot => write!(f, "one-shot"),
        }
    }
}

/// User settings. Settle delays are deliberately absent: they are fixed per
/// host capability mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Issue a global reinit before the per-port pass in targeted mode.
    pub global_prepass: bool,
    pub scheduler: SchedulerKind,
    /// Echo reconciliation summaries to the host console.
    pub console_messages: bool,
    /// `tracing` filter directive, overridden by `RUST_LOG`.
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            global_prepass: false,
            scheduler: SchedulerKind::PollTick,
            console_messages: false,
            log_filter: "info".to_string(),
        }
    }
}

impl Settings {
    pub fn from_toml(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load settings from `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(path, &contents)
    }

    /// Load settings if the file exists; a missing file means defaults.
    pub fn load_if_present(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }
}
