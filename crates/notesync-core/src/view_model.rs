//! Note view-model
//!
//! Presentation-facing state over a [`NoteRepository`]:
//!
//! - a shared [`UiStatus`] derived from the repository's notes stream,
//!   started by the first subscriber and released a grace period after the
//!   last one leaves;
//! - one-shot [`NoteEvent`]s reporting the outcome of each mutation, with no
//!   replay for late receivers;
//! - a single "selected note" slot owned by the caller.
//!
//! Mutations run as spawned tasks on the runtime captured at construction,
//! so callers may fire and forget or await the returned handle.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ViewModelConfig;
use crate::models::{Note, NoteEvent, UiStatus};
use crate::repository::{NoteRepository, NoteStream, NotesStream};

#[derive(Default)]
struct HubState {
    subscribers: usize,
    upstream: Option<JoinHandle<()>>,
    /// Pending release, tagged so a superseded timer cannot fire
    release: Option<(u64, JoinHandle<()>)>,
    next_release: u64,
}

/// Shares one notes subscription between every status subscriber
struct StatusHub {
    repository: NoteRepository,
    runtime: Handle,
    grace_period: Duration,
    sender: Arc<watch::Sender<UiStatus>>,
    state: Mutex<HubState>,
}

impl StatusHub {
    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribe(self: &Arc<Self>) -> StatusSubscription {
        let mut state = self.lock();
        state.subscribers += 1;
        if let Some((_, release)) = state.release.take() {
            release.abort();
            debug!("Status release cancelled");
        }
        if state.upstream.is_none() {
            self.start_upstream(&mut state);
        }

        StatusSubscription {
            receiver: self.sender.subscribe(),
            hub: Arc::clone(self),
        }
    }

    fn unsubscribe(self: &Arc<Self>) {
        let mut state = self.lock();
        state.subscribers = state.subscribers.saturating_sub(1);
        if state.subscribers > 0 || state.upstream.is_none() {
            return;
        }

        let token = state.next_release;
        state.next_release = state.next_release.wrapping_add(1);
        let hub = Arc::downgrade(self);
        let grace_period = self.grace_period;
        let timer = self.runtime.spawn(async move {
            tokio::time::sleep(grace_period).await;
            if let Some(hub) = Weak::upgrade(&hub) {
                hub.release(token);
            }
        });
        state.release = Some((token, timer));
    }

    fn release(&self, token: u64) {
        let mut state = self.lock();
        match &state.release {
            Some((pending, _)) if *pending == token => {}
            _ => return,
        }
        state.release = None;
        if state.subscribers > 0 {
            return;
        }
        if let Some(upstream) = state.upstream.take() {
            upstream.abort();
            debug!("Notes upstream released");
        }
    }

    fn retry(&self) -> bool {
        let mut state = self.lock();
        if state.subscribers == 0 {
            return false;
        }
        let live = state
            .upstream
            .as_ref()
            .is_some_and(|upstream| !upstream.is_finished());
        if live {
            return false;
        }

        info!("Restarting notes upstream");
        self.start_upstream(&mut state);
        true
    }

    fn start_upstream(&self, state: &mut HubState) {
        let notes = self.repository.notes_stream();
        let sender = Arc::clone(&self.sender);
        state.upstream = Some(self.runtime.spawn(pump_status(notes, sender)));
        debug!("Notes upstream started");
    }
}

impl Drop for StatusHub {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(upstream) = state.upstream.take() {
            upstream.abort();
        }
        if let Some((_, release)) = state.release.take() {
            release.abort();
        }
    }
}

async fn pump_status(mut notes: NotesStream, sender: Arc<watch::Sender<UiStatus>>) {
    while let Some(result) = notes.next().await {
        let status = match result {
            Ok(notes) => UiStatus::Success(notes),
            Err(e) => UiStatus::Error(format!("Failed to load notes: {}", e)),
        };
        sender.send_replace(status);
    }
    debug!("Notes upstream ended");
}

/// A live view of the shared [`UiStatus`]
///
/// Dropping the last subscription starts the grace period after which the
/// upstream is released.
pub struct StatusSubscription {
    receiver: watch::Receiver<UiStatus>,
    hub: Arc<StatusHub>,
}

impl StatusSubscription {
    /// The latest status
    pub fn current(&self) -> UiStatus {
        self.receiver.borrow().clone()
    }

    /// Wait for the status to change and return the new value
    pub async fn changed(&mut self) -> Option<UiStatus> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }
}

impl Drop for StatusSubscription {
    fn drop(&mut self) {
        self.hub.unsubscribe();
    }
}

/// View-model for note screens
pub struct NoteViewModel {
    repository: NoteRepository,
    runtime: Handle,
    status: Arc<StatusHub>,
    events: broadcast::Sender<NoteEvent>,
    selected: Option<Note>,
}

impl NoteViewModel {
    /// Create a view-model on the current Tokio runtime
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new(repository: NoteRepository, config: &ViewModelConfig) -> Self {
        let runtime = Handle::current();
        let (sender, _) = watch::channel(UiStatus::Loading);
        let status = Arc::new(StatusHub {
            repository: repository.clone(),
            runtime: runtime.clone(),
            grace_period: config.grace_period,
            sender: Arc::new(sender),
            state: Mutex::new(HubState::default()),
        });
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        Self {
            repository,
            runtime,
            status,
            events,
            selected: None,
        }
    }

    /// Subscribe to the shared note list status
    pub fn ui_status(&self) -> StatusSubscription {
        self.status.subscribe()
    }

    /// Restart the status upstream after it ended with an error
    ///
    /// Returns whether a new upstream was started; nothing happens while the
    /// upstream is still live or nobody is subscribed.
    pub fn retry(&self) -> bool {
        self.status.retry()
    }

    /// Receive operation outcomes published from now on
    pub fn events(&self) -> broadcast::Receiver<NoteEvent> {
        self.events.subscribe()
    }

    /// Persist a new note in the background
    pub fn add_note(&self, note: Note) -> JoinHandle<()> {
        let repository = self.repository.clone();
        let events = self.events.clone();
        self.runtime.spawn(async move {
            let event = match repository.add_note(&note).await {
                Ok(id) => {
                    info!(%id, "Note added");
                    NoteEvent::Success("Note added successfully".to_string())
                }
                Err(e) => NoteEvent::Error(format!("Failed to add note: {}", e)),
            };
            publish(&events, event);
        })
    }

    /// Replace a stored note in the background
    pub fn update_note(&self, note: Note) -> JoinHandle<()> {
        let repository = self.repository.clone();
        let events = self.events.clone();
        self.runtime.spawn(async move {
            let event = match repository.update_note(&note).await {
                Ok(()) => {
                    info!(id = %note.id, "Note updated");
                    NoteEvent::Success("Note updated successfully".to_string())
                }
                Err(e) => NoteEvent::Error(format!("Failed to update note: {}", e)),
            };
            publish(&events, event);
        })
    }

    /// Remove a note in the background
    pub fn delete_note(&self, id: impl Into<String>) -> JoinHandle<()> {
        let id = id.into();
        let repository = self.repository.clone();
        let events = self.events.clone();
        self.runtime.spawn(async move {
            let event = match repository.delete_note(&id).await {
                Ok(()) => {
                    info!(%id, "Note deleted");
                    NoteEvent::Success("Note deleted successfully".to_string())
                }
                Err(e) => NoteEvent::Error(format!("Failed to delete note: {}", e)),
            };
            publish(&events, event);
        })
    }

    /// Watch a single note
    pub fn get_note_by_id(&self, id: &str) -> NoteStream {
        self.repository.note_by_id_stream(id)
    }

    pub fn select_note(&mut self, note: Note) {
        self.selected = Some(note);
    }

    pub fn selected_note(&self) -> Option<&Note> {
        self.selected.as_ref()
    }

    /// Edit the selected note in place
    pub fn selected_note_mut(&mut self) -> Option<&mut Note> {
        self.selected.as_mut()
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }
}

fn publish(events: &broadcast::Sender<NoteEvent>, event: NoteEvent) {
    if event.is_error() {
        warn!("{}", event.message());
    }
    if events.send(event).is_err() {
        debug!("No event receivers, dropping note event");
    }
}
