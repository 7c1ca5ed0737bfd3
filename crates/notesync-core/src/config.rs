//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/notesync/config.toml)
//! 3. Environment variables (NOTESYNC_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable prefix
const ENV_PREFIX: &str = "NOTESYNC";

const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_GRACE_PERIOD_MS: u64 = 5000;
const DEFAULT_EVENT_CAPACITY: usize = 16;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the notes file
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// How often the file store re-reads the notes file (0 disables polling)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long the shared status stream outlives its last subscriber
    #[serde(default = "default_grace_period_ms")]
    pub status_grace_period_ms: u64,

    /// Buffer of the operation event broadcast
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Log file path (defaults to stderr)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            status_grace_period_ms: DEFAULT_GRACE_PERIOD_MS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (NOTESYNC_DATA_DIR, NOTESYNC_POLL_INTERVAL_MS,
    ///    NOTESYNC_GRACE_PERIOD_MS)
    /// 2. Config file (~/.config/notesync/config.toml or NOTESYNC_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var(format!("{}_POLL_INTERVAL_MS", ENV_PREFIX)) {
            if let Ok(ms) = val.trim().parse() {
                self.poll_interval_ms = ms;
            }
        }

        if let Ok(val) = std::env::var(format!("{}_GRACE_PERIOD_MS", ENV_PREFIX)) {
            if let Ok(ms) = val.trim().parse() {
                self.status_grace_period_ms = ms;
            }
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with NOTESYNC_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("notesync")
            .join("config.toml")
    }

    /// Get the path to the notes collection file
    pub fn notes_path(&self) -> PathBuf {
        self.data_dir.join("notes.json")
    }

    /// Poll interval for the file store, `None` when polling is off
    pub fn poll_interval(&self) -> Option<Duration> {
        (self.poll_interval_ms > 0).then(|| Duration::from_millis(self.poll_interval_ms))
    }

    /// Settings for the note view-model
    pub fn view_model(&self) -> ViewModelConfig {
        ViewModelConfig {
            grace_period: Duration::from_millis(self.status_grace_period_ms),
            event_capacity: self.event_capacity.max(1),
        }
    }
}

/// Tuning for [`crate::NoteViewModel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewModelConfig {
    /// How long the status upstream survives without subscribers
    pub grace_period: Duration,
    /// Capacity of the event broadcast buffer
    pub event_capacity: usize,
}

impl Default for ViewModelConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_millis(DEFAULT_GRACE_PERIOD_MS),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("notesync")
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_grace_period_ms() -> u64 {
    DEFAULT_GRACE_PERIOD_MS
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "NOTESYNC_DATA_DIR",
        "NOTESYNC_POLL_INTERVAL_MS",
        "NOTESYNC_GRACE_PERIOD_MS",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.status_grace_period_ms, 5000);
        assert_eq!(config.event_capacity, 16);
        assert!(config.log_file.is_none());
        assert!(config.data_dir.ends_with("notesync"));
    }

    #[test]
    fn test_file_paths() {
        let config = Config::default();
        assert!(config.notes_path().ends_with("notes.json"));
    }

    #[test]
    fn test_poll_interval_zero_disables_polling() {
        let mut config = Config::default();
        assert_eq!(config.poll_interval(), Some(Duration::from_secs(1)));

        config.poll_interval_ms = 0;
        assert!(config.poll_interval().is_none());
    }

    #[test]
    fn test_view_model_config() {
        let mut config = Config::default();
        config.status_grace_period_ms = 250;
        config.event_capacity = 0;

        let vm = config.view_model();
        assert_eq!(vm.grace_period, Duration::from_millis(250));
        assert_eq!(vm.event_capacity, 1);
    }

    #[test]
    fn test_env_override_data_dir() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("NOTESYNC_DATA_DIR", "/tmp/notesync-test");
        config.apply_env_overrides();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/notesync-test"));
    }

    #[test]
    fn test_env_override_intervals() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("NOTESYNC_POLL_INTERVAL_MS", "250");
        env::set_var("NOTESYNC_GRACE_PERIOD_MS", "100");
        config.apply_env_overrides();
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.status_grace_period_ms, 100);

        // Garbage is ignored
        env::set_var("NOTESYNC_POLL_INTERVAL_MS", "soon");
        config.apply_env_overrides();
        assert_eq!(config.poll_interval_ms, 250);
    }

    #[test]
    fn test_serialization() {
        let _guard = EnvGuard::new(ENV_VARS);

        let config = Config {
            data_dir: PathBuf::from("/data/notesync"),
            poll_interval_ms: 500,
            status_grace_period_ms: 2000,
            event_capacity: 8,
            log_file: None,
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("data_dir"));
        assert!(toml_str.contains("poll_interval_ms"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.data_dir, config.data_dir);
        assert_eq!(parsed.poll_interval_ms, 500);
        assert_eq!(parsed.status_grace_period_ms, 2000);
        assert_eq!(parsed.event_capacity, 8);
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            data_dir = "/custom/data"
            poll_interval_ms = 0
            log_file = "/tmp/notesync.log"
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert!(config.poll_interval().is_none());
        assert_eq!(config.status_grace_period_ms, 5000);
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/notesync.log")));
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = tempfile::TempDir::new().unwrap();
        env::set_var("NOTESYNC_DATA_DIR", temp_dir.path().join("data"));

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.poll_interval_ms, 1000);
        assert!(config.data_dir.exists());
    }
}
