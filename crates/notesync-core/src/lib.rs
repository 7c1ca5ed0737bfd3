//! notesync Core Library
//!
//! This crate provides the core functionality for notesync, a reactive
//! note-taking system backed by a document store.
//!
//! # Architecture
//!
//! - **DocumentStore**: Backing database contract (server-assigned ids,
//!   whole-document writes, push subscriptions)
//! - **NoteRepository**: Typed note operations and streams over a store
//! - **NoteViewModel**: Shared UI status, one-shot operation events and the
//!   selected note
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let store = Arc::new(FileDocumentStore::open(&config)?);
//! let view_model = NoteViewModel::new(NoteRepository::new(store), &config.view_model());
//!
//! let mut events = view_model.events();
//! view_model.add_note(Note::new("Groceries", "milk, eggs"));
//! println!("{}", events.recv().await?.message());
//!
//! let status = view_model.ui_status();
//! ```
//!
//! # Modules
//!
//! - `store`: Document store contract and its memory/file implementations
//! - `repository`: Note operations and streams
//! - `view_model`: Presentation state
//! - `models`: Note, UI status and event types
//! - `error`: Store and repository errors
//! - `config`: Application configuration

pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod store;
pub mod view_model;

pub use config::{Config, ViewModelConfig};
pub use error::{RepositoryError, RepositoryResult, StoreError, StoreResult};
pub use models::{Note, NoteEvent, UiStatus, PALETTE};
pub use repository::{NoteRepository, NoteStream, NotesStream};
pub use store::{DocumentStore, FileDocumentStore, MemoryDocumentStore};
pub use view_model::{NoteViewModel, StatusSubscription};
