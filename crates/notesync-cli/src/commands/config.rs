//! Config command handlers

use anyhow::Result;

use notesync_core::Config;

use crate::output::{Output, OutputFormat};

/// Show the effective configuration
pub fn show(config: &Config, output: &Output) -> Result<()> {
    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "poll_interval_ms": config.poll_interval_ms,
                    "status_grace_period_ms": config.status_grace_period_ms,
                    "event_capacity": config.event_capacity,
                    "log_file": config.log_file
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            println!("Configuration:");
            println!("  data_dir:               {}", config.data_dir.display());
            println!(
                "  poll_interval_ms:       {}{}",
                config.poll_interval_ms,
                if config.poll_interval().is_none() {
                    " (polling off)"
                } else {
                    ""
                }
            );
            println!(
                "  status_grace_period_ms: {}",
                config.status_grace_period_ms
            );
            println!("  event_capacity:         {}", config.event_capacity);
            println!(
                "  log_file:               {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(stderr)".to_string())
            );
            println!();
            println!("Notes file:  {}", config.notes_path().display());
            println!("Config file: {}", Config::config_file_path().display());
        }
    }

    Ok(())
}
