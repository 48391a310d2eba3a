use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "cert-watcher.toml";

/// Configuration loaded from `cert-watcher.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WatcherConfig {
    /// Certificate and config files to watch.
    pub paths: Vec<PathBuf>,
    /// Event silence required before a burst counts as settled.
    pub quiet_period_ms: u64,
    /// Delay between registration attempts for paths that do not exist yet.
    pub retry_interval_ms: u64,
    /// Shell command run by the agent on every reload signal.
    pub reload_command: Option<String>,
    /// Drop settle events that leave the watched content byte-identical.
    pub skip_unchanged: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            quiet_period_ms: 100,
            retry_interval_ms: 500,
            reload_command: None,
            skip_unchanged: false,
        }
    }
}

impl WatcherConfig {
    /// Load configuration from the TOML file at `path`.
    ///
    /// Returns a default configuration if the file does not exist or cannot be parsed.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Self>(&contents) {
                Ok(config) => config,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to parse config; using defaults");
                    Self::default()
                }
            },
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read config; using defaults");
                Self::default()
            }
        }
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}
