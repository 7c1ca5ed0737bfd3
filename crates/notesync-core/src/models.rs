//! Data models for notesync
//!
//! Defines the `Note` entity plus the derived values the view-model hands to
//! consumers: `UiStatus` and `NoteEvent`.
//!
//! Notes are stored as schemaless documents, so every field has a serde
//! default and the wire names follow the document store's camelCase.

use chrono::{DateTime, TimeZone, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{RepositoryError, RepositoryResult};

/// Display accents a note may select with `color_id`
pub const PALETTE: [&str; 5] = ["#FFB3BA", "#FFDFBA", "#FFFFBA", "#BAFFC9", "#BAE1FF"];

/// A text note
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Note {
    /// Store-assigned identifier (empty until first persisted)
    pub id: String,
    /// Short title, not unique
    pub title: String,
    /// Free-form body
    pub description: String,
    /// Index into [`PALETTE`]
    pub color_id: u8,
    /// Creation time in epoch milliseconds
    pub created_at: i64,
}

impl Note {
    /// Create an unpersisted note with a random accent and the current time
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            title: title.into(),
            description: description.into(),
            color_id: rand::rng().random_range(0..PALETTE.len() as u8),
            created_at: Utc::now().timestamp_millis(),
        }
    }

    /// Set an explicit accent
    pub fn with_color(mut self, color_id: u8) -> Self {
        self.color_id = color_id;
        self
    }

    /// Whether the store has assigned an identifier yet
    pub fn is_persisted(&self) -> bool {
        !self.id.trim().is_empty()
    }

    /// Update the title
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    /// Update the description
    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    /// The palette entry for this note, if `color_id` is in range
    pub fn color(&self) -> Option<&'static str> {
        PALETTE.get(self.color_id as usize).copied()
    }

    /// `created_at` as a UTC timestamp
    pub fn created_at_datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.created_at)
            .single()
            .unwrap_or_default()
    }

    /// Reject notes the store must never see
    pub fn validate(&self) -> RepositoryResult<()> {
        if self.color().is_none() {
            return Err(RepositoryError::InvalidNote(format!(
                "color id {} is outside the palette (0..{})",
                self.color_id,
                PALETTE.len()
            )));
        }
        Ok(())
    }
}

/// Status of the note list as seen by a consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiStatus {
    /// No snapshot has arrived yet
    Loading,
    /// Latest collection snapshot
    Success(Vec<Note>),
    /// The collection stream failed
    Error(String),
}

impl UiStatus {
    /// Notes in the latest snapshot, if any
    pub fn notes(&self) -> Option<&[Note]> {
        match self {
            UiStatus::Success(notes) => Some(notes),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, UiStatus::Loading)
    }
}

/// Outcome of a single mutating operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteEvent {
    Success(String),
    Error(String),
}

impl NoteEvent {
    pub fn message(&self) -> &str {
        match self {
            NoteEvent::Success(message) | NoteEvent::Error(message) => message,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, NoteEvent::Error(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_new() {
        let note = Note::new("Groceries", "milk, eggs");
        assert!(note.id.is_empty());
        assert!(!note.is_persisted());
        assert_eq!(note.title, "Groceries");
        assert_eq!(note.description, "milk, eggs");
        assert!((note.color_id as usize) < PALETTE.len());
        assert!(note.created_at > 0);
    }

    #[test]
    fn test_note_validate() {
        let note = Note::new("Title", "Body").with_color(4);
        assert!(note.validate().is_ok());
        assert_eq!(note.color(), Some(PALETTE[4]));

        let note = Note::new("Title", "Body").with_color(5);
        let err = note.validate().unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidNote(_)));
        assert!(err.to_string().contains("outside the palette"));
    }

    #[test]
    fn test_blank_id_is_not_persisted() {
        let mut note = Note::new("Title", "Body");
        note.id = "   ".to_string();
        assert!(!note.is_persisted());
        note.id = "abc".to_string();
        assert!(note.is_persisted());
    }

    #[test]
    fn test_created_at_datetime() {
        let mut note = Note::new("Title", "Body");
        note.created_at = 1_700_000_000_000;
        assert_eq!(note.created_at_datetime().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_wire_names() {
        let mut note = Note::new("Title", "Body").with_color(2);
        note.created_at = 42;
        let value = serde_json::to_value(&note).unwrap();
        assert_eq!(value["colorId"], 2);
        assert_eq!(value["createdAt"], 42);
        assert_eq!(value["id"], "");
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let note: Note = serde_json::from_str(r#"{"title":"Only title"}"#).unwrap();
        assert_eq!(note.title, "Only title");
        assert!(note.description.is_empty());
        assert_eq!(note.color_id, 0);
        assert_eq!(note.created_at, 0);
    }

    #[test]
    fn test_status_helpers() {
        assert!(UiStatus::Loading.is_loading());
        assert!(UiStatus::Loading.notes().is_none());
        let status = UiStatus::Success(vec![Note::new("A", "x")]);
        assert_eq!(status.notes().unwrap().len(), 1);

        let event = NoteEvent::Error("Failed to add note: boom".to_string());
        assert!(event.is_error());
        assert_eq!(event.message(), "Failed to add note: boom");
    }
}
