//! Note repository
//!
//! Thin layer over a [`DocumentStore`]: turns write outcomes into
//! `RepositoryResult`s and store subscriptions into note streams. It holds no
//! state of its own beyond the store handle.
//!
//! The two streams fail differently on purpose:
//! - [`NoteRepository::notes_stream`] yields one `Err` and ends on any
//!   transport or decode failure; callers re-subscribe to recover.
//! - [`NoteRepository::note_by_id_stream`] never fails; missing documents,
//!   undecodable documents and transport errors all read as `None`.

use std::sync::Arc;

use futures_util::stream::{self, BoxStream, StreamExt};
use tracing::{debug, error, warn};

use crate::error::{RepositoryError, RepositoryResult, StoreError};
use crate::models::Note;
use crate::store::{
    CollectionSnapshot, Document, DocumentSnapshot, DocumentStore, StoredDocument, Subscription,
};

/// Every collection snapshot, decoded
pub type NotesStream = BoxStream<'static, RepositoryResult<Vec<Note>>>;

/// One note's current value, `None` while it cannot be shown
pub type NoteStream = BoxStream<'static, Option<Note>>;

/// Note operations over a document store
#[derive(Clone)]
pub struct NoteRepository {
    store: Arc<dyn DocumentStore>,
}

impl NoteRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Persist a new note and return the id the store assigned
    ///
    /// Runs in two phases: the body is inserted with an empty `id`, then the
    /// stored document is replaced with the assigned id patched in. Between
    /// the phases collection subscribers can observe the note with an empty
    /// id, and a failure in the second phase leaves that document behind.
    pub async fn add_note(&self, note: &Note) -> RepositoryResult<String> {
        note.validate()?;

        let provisional = Note {
            id: String::new(),
            ..note.clone()
        };
        let result: RepositoryResult<String> = async {
            let id = self.store.add(encode(&provisional)?).await?;
            let stored = Note {
                id: id.clone(),
                ..provisional.clone()
            };
            self.store.set(&id, encode(&stored)?).await?;
            Ok(id)
        }
        .await;

        result.inspect_err(|e| error!("Error adding note: {}", e))
    }

    /// Replace the stored note with `note`
    pub async fn update_note(&self, note: &Note) -> RepositoryResult<()> {
        if !note.is_persisted() {
            error!("Refusing to update note without an id");
            return Err(RepositoryError::NotFound {
                id: note.id.clone(),
            });
        }
        note.validate()?;

        let result: RepositoryResult<()> = async {
            self.store.set(&note.id, encode(note)?).await?;
            Ok(())
        }
        .await;

        result.inspect_err(|e| error!("Error updating note {}: {}", note.id, e))
    }

    /// Remove the note at `id`
    ///
    /// Removing a note that no longer exists succeeds.
    pub async fn delete_note(&self, id: &str) -> RepositoryResult<()> {
        if id.trim().is_empty() {
            error!("Refusing to delete note with blank id");
            return Err(RepositoryError::NotFound { id: id.to_string() });
        }

        self.store
            .delete(id)
            .await
            .map_err(RepositoryError::from)
            .inspect_err(|e| error!("Error deleting note {}: {}", id, e))
    }

    /// Watch the full note list
    ///
    /// Each subscription starts from the store's current state. The first
    /// failure is yielded as `Err`, the listener is released and the stream
    /// ends.
    pub fn notes_stream(&self) -> NotesStream {
        enum State {
            Pending(Arc<dyn DocumentStore>),
            Live(Subscription<CollectionSnapshot>),
            Done,
        }

        let initial = State::Pending(Arc::clone(&self.store));
        stream::unfold(initial, |state| async move {
            let mut subscription = match state {
                State::Pending(store) => match store.subscribe_collection().await {
                    Ok(subscription) => subscription,
                    Err(e) => {
                        error!("Error setting up notes listener: {}", e);
                        return Some((Err(e.into()), State::Done));
                    }
                },
                State::Live(subscription) => subscription,
                State::Done => return None,
            };

            match subscription.next_snapshot().await? {
                Ok(snapshot) => match decode_collection(&snapshot) {
                    Ok(notes) => Some((Ok(notes), State::Live(subscription))),
                    Err(e) => {
                        error!("Error decoding notes: {}", e);
                        Some((Err(e), State::Done))
                    }
                },
                Err(e) => {
                    error!("Error fetching notes: {}", e);
                    Some((Err(e.into()), State::Done))
                }
            }
        })
        .boxed()
    }

    /// Watch a single note
    ///
    /// A blank `id` yields `None` once without touching the store.
    pub fn note_by_id_stream(&self, id: &str) -> NoteStream {
        if id.trim().is_empty() {
            error!("Invalid note id: '{}'", id);
            return stream::once(async { None }).boxed();
        }

        enum State {
            Pending(Arc<dyn DocumentStore>, String),
            Live(Subscription<DocumentSnapshot>),
            Done,
        }

        let initial = State::Pending(Arc::clone(&self.store), id.to_string());
        stream::unfold(initial, |state| async move {
            let mut subscription = match state {
                State::Pending(store, id) => {
                    debug!("Fetching note with id: {}", id);
                    match store.subscribe_document(&id).await {
                        Ok(subscription) => subscription,
                        Err(e) => {
                            error!("Error setting up note listener for {}: {}", id, e);
                            return Some((None, State::Done));
                        }
                    }
                }
                State::Live(subscription) => subscription,
                State::Done => return None,
            };

            let note = match subscription.next_snapshot().await? {
                Ok(snapshot) => decode_document(&snapshot),
                Err(e) => {
                    error!("Error fetching note: {}", e);
                    None
                }
            };
            Some((note, State::Live(subscription)))
        })
        .boxed()
    }
}

fn encode(note: &Note) -> RepositoryResult<Document> {
    Ok(serde_json::to_value(note).map_err(StoreError::from)?)
}

/// Decode stored bodies as-is; the body's own `id` field is kept
fn decode_collection(snapshot: &[StoredDocument]) -> RepositoryResult<Vec<Note>> {
    snapshot
        .iter()
        .map(|doc| {
            serde_json::from_value(doc.data.clone()).map_err(|source| RepositoryError::Decode {
                id: doc.id.clone(),
                source,
            })
        })
        .collect()
}

/// Decode one document, taking the id from the document key
fn decode_document(snapshot: &DocumentSnapshot) -> Option<Note> {
    let Some(data) = snapshot.data.clone() else {
        warn!("Note {} does not exist", snapshot.id);
        return None;
    };

    match serde_json::from_value::<Note>(data) {
        Ok(note) => {
            debug!("Fetched note {}", snapshot.id);
            Some(Note {
                id: snapshot.id.clone(),
                ..note
            })
        }
        Err(e) => {
            error!("Error decoding note {}: {}", snapshot.id, e);
            None
        }
    }
}
