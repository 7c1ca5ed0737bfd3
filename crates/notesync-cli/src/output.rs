//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde::Serialize;

use notesync_core::{Note, NoteEvent, UiStatus};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print a single note
    pub fn print_note(&self, note: &Note) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:          {}", display_id(&note.id));
                println!("Title:       {}", note.title);
                println!(
                    "Color:       {} ({})",
                    note.color_id,
                    note.color().unwrap_or("outside palette")
                );
                println!(
                    "Created:     {}",
                    note.created_at_datetime().format("%Y-%m-%d %H:%M")
                );
                if !note.description.is_empty() {
                    println!();
                    println!("{}", note.description);
                }
            }
            OutputFormat::Json => print_json(note),
            OutputFormat::Quiet => println!("{}", note.id),
        }
    }

    /// Print a list of notes
    pub fn print_notes(&self, notes: &[Note]) {
        match self.format {
            OutputFormat::Human => {
                if notes.is_empty() {
                    println!("No notes found.");
                    return;
                }
                for note in notes {
                    println!(
                        "{} | {} | {}",
                        short_id(&note.id),
                        truncate(&note.title, 30),
                        truncate_line(&note.description, 45)
                    );
                }
                println!("\n{} note(s)", notes.len());
            }
            OutputFormat::Json => print_json(&notes),
            OutputFormat::Quiet => {
                for note in notes {
                    println!("{}", note.id);
                }
            }
        }
    }

    /// Print a note list status
    pub fn print_status(&self, status: &UiStatus) {
        match (self.format, status) {
            (OutputFormat::Json, UiStatus::Loading) => {
                println!("{}", serde_json::json!({"status": "loading"}));
            }
            (OutputFormat::Json, UiStatus::Success(notes)) => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "notes": notes})
                );
            }
            (OutputFormat::Json, UiStatus::Error(message)) => {
                println!(
                    "{}",
                    serde_json::json!({"status": "error", "message": message})
                );
            }
            (OutputFormat::Human, UiStatus::Loading) => println!("Loading notes..."),
            (_, UiStatus::Success(notes)) => self.print_notes(notes),
            (_, UiStatus::Error(message)) => eprintln!("✗ {}", message),
            (OutputFormat::Quiet, UiStatus::Loading) => {}
        }
    }

    /// Print the outcome of an operation
    pub fn print_event(&self, event: &NoteEvent) {
        match event {
            NoteEvent::Success(message) => self.success(message),
            NoteEvent::Error(message) => match self.format {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::json!({"status": "error", "message": message})
                    );
                }
                _ => eprintln!("✗ {}", message),
            },
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize output: {}", e),
    }
}

/// Full id, or a marker for a note still waiting for its id
fn display_id(id: &str) -> &str {
    if id.is_empty() {
        "(pending)"
    } else {
        id
    }
}

/// First eight characters of an id
pub fn short_id(id: &str) -> &str {
    if id.is_empty() {
        return display_id(id);
    }
    match id.char_indices().nth(8) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

/// Truncate a string to max length, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Truncate to first line and max length
fn truncate_line(s: &str, max_len: usize) -> String {
    let first_line = s.lines().next().unwrap_or("");
    truncate(first_line, max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
        assert_eq!(truncate("ünïcödé ünïcödé", 8), "ünïcö...");
    }

    #[test]
    fn test_truncate_line() {
        assert_eq!(truncate_line("single line", 20), "single line");
        assert_eq!(truncate_line("line one\nline two", 20), "line one");
        assert_eq!(truncate_line("", 20), "");
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("abc"), "abc");
        assert_eq!(short_id(""), "(pending)");
    }
}
