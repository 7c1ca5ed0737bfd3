//! Watch command
//!
//! Streams note list changes (including writes made by other processes,
//! picked up by the store poller) until Ctrl-C.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tracing::{debug, warn};

use notesync_core::{NoteViewModel, UiStatus};

use crate::output::Output;

/// Delay before restarting the note list after it failed
const RETRY_DELAY: Duration = Duration::from_secs(5);

pub async fn run(view_model: &NoteViewModel, output: &Output) -> Result<()> {
    let mut status = view_model.ui_status();
    let mut events = view_model.events();
    let mut retry_at = None;

    output.message("Watching notes (Ctrl-C to stop)...");
    output.print_status(&status.current());

    loop {
        tokio::select! {
            changed = status.changed() => {
                let Some(current) = changed else { break };
                retry_at = retry_deadline(&current);
                output.print_status(&current);
            }
            event = events.recv() => match event {
                Ok(event) => output.print_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {} note events", skipped),
                Err(RecvError::Closed) => break,
            },
            _ = sleep_until(retry_at) => {
                retry_at = None;
                if view_model.retry() {
                    debug!("Retrying note list");
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                break;
            }
        }
    }

    Ok(())
}

fn retry_deadline(status: &UiStatus) -> Option<Instant> {
    match status {
        UiStatus::Error(_) => Some(Instant::now() + RETRY_DELAY),
        _ => None,
    }
}

/// Sleep until `deadline`, or forever without one
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_only_after_errors() {
        assert!(retry_deadline(&UiStatus::Error("boom".to_string())).is_some());
        assert!(retry_deadline(&UiStatus::Loading).is_none());
        assert!(retry_deadline(&UiStatus::Success(Vec::new())).is_none());
    }
}
