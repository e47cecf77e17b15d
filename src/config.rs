//! Loadboard configuration.
//!
//! Loaded from `~/.loadboard/config.toml`. A missing file means defaults.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::board::DEFAULT_KEEP_RUNS;
use crate::classify::DonePolicy;

/// Loadboard configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    /// Active-orders feed endpoint.
    pub feed_url: Option<String>,

    /// Database file. Defaults to `~/.loadboard/board.sqlite`.
    pub database: Option<PathBuf>,

    /// When a line counts as done.
    pub done_policy: DonePolicy,

    /// Reconciliation runs kept in the history.
    pub keep_runs: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed_url: None,
            database: None,
            done_policy: DonePolicy::default(),
            keep_runs: DEFAULT_KEEP_RUNS,
        }
    }
}

impl Config {
    /// Load config from `~/.loadboard/config.toml`.
    /// Returns the defaults when the file (or the home directory) is missing.
    pub fn load() -> Result<Self, String> {
        match Self::path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load config from an explicit path, defaulting when it doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let contents = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(format!("failed to read {}: {e}", path.display())),
        };

        let config: Self = toml::from_str(&contents)
            .map_err(|e| format!("invalid config at {}: {e}", path.display()))?;

        if config.feed_url.as_deref().is_some_and(|u| u.trim().is_empty()) {
            return Err(format!("feed-url is empty in {}", path.display()));
        }

        Ok(config)
    }

    /// The config file path: `~/.loadboard/config.toml`.
    pub fn path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".loadboard").join("config.toml"))
    }
}
