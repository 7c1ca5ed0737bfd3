//! Note command handlers
//!
//! Every command goes through the view-model: mutations report their outcome
//! on the event broadcast, reads come from the status and note streams.

use anyhow::{anyhow, bail, Context, Result};
use futures_util::StreamExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use notesync_core::{Note, NoteEvent, NoteViewModel, UiStatus};

use crate::editor::{confirm, edit_text, strip_comments};
use crate::output::{short_id, Output};

/// Field changes requested by `edit`
#[derive(Debug, Default)]
pub struct NoteChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub color: Option<u8>,
}

impl NoteChanges {
    fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.color.is_none()
    }

    fn apply(self, note: &mut Note) {
        if let Some(title) = self.title {
            note.set_title(title);
        }
        if let Some(description) = self.description {
            note.set_description(description);
        }
        if let Some(color_id) = self.color {
            note.color_id = color_id;
        }
    }
}

/// Create a new note
pub async fn add(
    view_model: &NoteViewModel,
    title: String,
    description: Option<String>,
    color: Option<u8>,
    output: &Output,
) -> Result<()> {
    if title.trim().is_empty() {
        bail!("Note title cannot be empty");
    }

    let description = match description {
        Some(d) => d,
        None => {
            let initial = format!("<!-- Description for: {} -->\n\n", title);
            let edited = edit_text(&initial).context("Failed to edit description")?;
            strip_comments(&edited)
        }
    };

    let mut note = Note::new(title, description);
    if let Some(color_id) = color {
        note = note.with_color(color_id);
    }

    let mut events = view_model.events();
    let event = await_event(view_model.add_note(note), &mut events).await?;
    report(event, output)
}

/// List all notes
pub async fn list(view_model: &NoteViewModel, output: &Output) -> Result<()> {
    let notes = load_notes(view_model).await?;
    output.print_notes(&notes);
    Ok(())
}

/// Show a single note
pub async fn show(view_model: &NoteViewModel, id: String, output: &Output) -> Result<()> {
    let id = resolve_id(view_model, &id).await?;
    let note = fetch_note(view_model, &id).await?;
    output.print_note(&note);
    Ok(())
}

/// Edit a note
///
/// The note is loaded into the view-model's selection, changed there and
/// written back. Without any field flags the description opens in $EDITOR.
pub async fn edit(
    view_model: &mut NoteViewModel,
    id: String,
    changes: NoteChanges,
    output: &Output,
) -> Result<()> {
    let id = resolve_id(view_model, &id).await?;
    let note = fetch_note(view_model, &id).await?;
    view_model.select_note(note);

    let Some(selected) = view_model.selected_note_mut() else {
        bail!("No note selected");
    };
    if changes.is_empty() {
        let edited = edit_text(&selected.description).context("Failed to edit description")?;
        selected.set_description(edited.trim());
    } else {
        changes.apply(selected);
    }
    let note = selected.clone();

    let mut events = view_model.events();
    let event = await_event(view_model.update_note(note), &mut events).await;
    view_model.clear_selection();
    report(event?, output)
}

/// Delete a note
pub async fn delete(view_model: &NoteViewModel, id: String, output: &Output) -> Result<()> {
    let id = resolve_id(view_model, &id).await?;

    if output.should_prompt() {
        let note = fetch_note(view_model, &id).await?;
        println!("Delete note: {} - {}", short_id(&note.id), note.title);
        if !confirm("Are you sure?")? {
            output.message("Cancelled.");
            return Ok(());
        }
    }

    let mut events = view_model.events();
    let event = await_event(view_model.delete_note(id), &mut events).await?;
    report(event, output)
}

/// Wait for the first loaded note list
async fn load_notes(view_model: &NoteViewModel) -> Result<Vec<Note>> {
    let mut status = view_model.ui_status();
    loop {
        match status.current() {
            UiStatus::Success(notes) => return Ok(notes),
            UiStatus::Error(message) => bail!("{}", message),
            UiStatus::Loading => {
                status.changed().await.context("Note status closed")?;
            }
        }
    }
}

async fn fetch_note(view_model: &NoteViewModel, id: &str) -> Result<Note> {
    view_model
        .get_note_by_id(id)
        .next()
        .await
        .flatten()
        .ok_or_else(|| anyhow!("Note not found: {}", id))
}

/// Resolve a full id or unique id prefix against the current notes
async fn resolve_id(view_model: &NoteViewModel, id: &str) -> Result<String> {
    let notes = load_notes(view_model).await?;
    match_prefix(&notes, id)
}

fn match_prefix(notes: &[Note], prefix: &str) -> Result<String> {
    let prefix = prefix.trim();
    if prefix.is_empty() {
        bail!("Note ID cannot be empty");
    }

    if let Some(note) = notes.iter().find(|n| n.id == prefix) {
        return Ok(note.id.clone());
    }

    let matches: Vec<&Note> = notes
        .iter()
        .filter(|n| n.is_persisted() && n.id.starts_with(prefix))
        .collect();
    match matches.as_slice() {
        [] => bail!("Note not found: {}", prefix),
        [note] => Ok(note.id.clone()),
        _ => bail!(
            "Ambiguous note ID '{}' matches {} notes. Use more characters.",
            prefix,
            matches.len()
        ),
    }
}

async fn await_event(
    task: JoinHandle<()>,
    events: &mut broadcast::Receiver<NoteEvent>,
) -> Result<NoteEvent> {
    task.await.context("Note operation task failed")?;
    events.recv().await.context("No result from note operation")
}

fn report(event: NoteEvent, output: &Output) -> Result<()> {
    match event {
        NoteEvent::Success(message) => {
            output.success(&message);
            Ok(())
        }
        NoteEvent::Error(message) => bail!("{}", message),
    }
}
