//! Document store adapter
//!
//! The narrow contract the repository needs from a backing document
//! database: server-assigned ids on insert, whole-document replace and
//! delete, and push-based subscriptions to the collection or to a single
//! document.
//!
//! ## Subscriptions
//!
//! Every subscription receives an immediate snapshot of current state and a
//! fresh snapshot after each change to its target. Transport failures arrive
//! as `Err` items; when the store itself goes away the subscription yields
//! `Err(StoreError::Closed)` once and then ends. A [`Subscription`] owns its
//! [`ListenerRegistration`], so dropping the subscription removes the
//! listener from the store exactly once, whichever way the consumer stops.
//!
//! ## Implementations
//!
//! - [`MemoryDocumentStore`]: in-process, with failure injection for tests
//! - [`FileDocumentStore`]: JSON file in the data directory, polled for
//!   writes from other processes

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

mod file;
mod memory;

pub use file::FileDocumentStore;
pub use memory::MemoryDocumentStore;

/// A schemaless document body (always a JSON object)
pub type Document = serde_json::Value;

/// A document together with its store key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: String,
    pub data: Document,
}

/// All documents of the collection, in insertion order
pub type CollectionSnapshot = Vec<StoredDocument>;

/// Current state of a single document
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub id: String,
    /// `None` when the document does not exist
    pub data: Option<Document>,
}

impl DocumentSnapshot {
    pub fn exists(&self) -> bool {
        self.data.is_some()
    }
}

/// Backing store for note documents
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a document and return the identifier the store assigned
    async fn add(&self, document: Document) -> StoreResult<String>;

    /// Replace the document at `id`, creating it when absent
    async fn set(&self, id: &str, document: Document) -> StoreResult<()>;

    /// Remove the document at `id`; removing a missing document succeeds
    async fn delete(&self, id: &str) -> StoreResult<()>;

    /// Watch the whole collection
    async fn subscribe_collection(&self) -> StoreResult<Subscription<CollectionSnapshot>>;

    /// Watch one document
    async fn subscribe_document(&self, id: &str) -> StoreResult<Subscription<DocumentSnapshot>>;
}

/// Generate a fresh document identifier
pub(crate) fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}

pub(crate) fn ensure_object(id: &str, document: &Document) -> StoreResult<()> {
    if document.is_object() {
        Ok(())
    } else {
        Err(StoreError::InvalidDocument {
            id: id.to_string(),
            details: "document body must be a JSON object".to_string(),
        })
    }
}

/// Handle to a listener registered with a store
///
/// Dropping the handle deregisters the listener. Deregistration runs at most
/// once.
pub struct ListenerRegistration {
    deregister: Option<Box<dyn FnOnce() + Send>>,
}

impl ListenerRegistration {
    pub fn new(deregister: impl FnOnce() + Send + 'static) -> Self {
        Self {
            deregister: Some(Box::new(deregister)),
        }
    }

    /// Deregister now
    pub fn remove(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(deregister) = self.deregister.take() {
            deregister();
        }
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.run();
    }
}

impl fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("active", &self.deregister.is_some())
            .finish()
    }
}

/// A live stream of snapshots from a store
pub struct Subscription<T> {
    receiver: mpsc::UnboundedReceiver<StoreResult<T>>,
    registration: ListenerRegistration,
    closed: bool,
}

impl<T> Subscription<T> {
    pub fn new(
        receiver: mpsc::UnboundedReceiver<StoreResult<T>>,
        registration: ListenerRegistration,
    ) -> Self {
        Self {
            receiver,
            registration,
            closed: false,
        }
    }

    /// Wait for the next snapshot
    ///
    /// Yields `Err(StoreError::Closed)` once if the store dropped the
    /// listener, `None` after that.
    pub async fn next_snapshot(&mut self) -> Option<StoreResult<T>> {
        let item = self.receiver.recv().await;
        self.on_item(item)
    }

    /// Take an already-delivered snapshot without waiting
    pub fn try_next_snapshot(&mut self) -> Option<StoreResult<T>> {
        match self.receiver.try_recv() {
            Ok(item) => Some(item),
            Err(mpsc::error::TryRecvError::Empty) => None,
            Err(mpsc::error::TryRecvError::Disconnected) => self.on_item(None),
        }
    }

    fn on_item(&mut self, item: Option<StoreResult<T>>) -> Option<StoreResult<T>> {
        match item {
            Some(item) => Some(item),
            None if self.closed => None,
            None => {
                self.closed = true;
                Some(Err(StoreError::Closed))
            }
        }
    }

    /// Stop listening and deregister from the store
    pub fn cancel(self) {
        let Subscription {
            mut receiver,
            registration,
            ..
        } = self;
        receiver.close();
        registration.remove();
    }
}

impl<T> Stream for Subscription<T> {
    type Item = StoreResult<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let item = std::task::ready!(self.receiver.poll_recv(cx));
        Poll::Ready(self.on_item(item))
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("registration", &self.registration)
            .finish()
    }
}
