//! Diagnostic logging
//!
//! Only initializes if the NOTESYNC_LOG environment variable is set.
//! Logs to `config.log_file` when configured, stderr otherwise.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing::info;
use tracing_subscriber::EnvFilter;

use notesync_core::Config;

/// Environment variable holding the log level
const LOG_ENV: &str = "NOTESYNC_LOG";

pub fn init(config: &Config) {
    let Ok(log_level) = std::env::var(LOG_ENV) else {
        return;
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter_directives(&log_level)))
        .with_target(false);

    // Ignore error if already initialized
    let initialized = match &config.log_file {
        Some(log_path) => {
            let log_file = match OpenOptions::new().create(true).append(true).open(log_path) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("Warning: Could not open log file {:?}: {}", log_path, e);
                    return;
                }
            };
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(log_file))
                .try_init()
                .is_ok()
        }
        None => builder.with_writer(std::io::stderr).try_init().is_ok(),
    };

    if initialized {
        info!("Logging initialized at level {}", log_level.trim());
    }
}

/// Scope the level to this workspace's crates
fn filter_directives(log_level: &str) -> String {
    let level = log_level.trim();
    format!("notesync_core={},notesync_cli={}", level, level)
}
