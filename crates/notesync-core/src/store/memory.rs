//! In-memory document store
//!
//! Keeps documents in insertion order and notifies listeners synchronously
//! while holding the state lock, so each listener sees snapshots in write
//! order and nothing is queued for a listener once it is deregistered.
//!
//! Failure injection (`fail_next_writes`, `set_writes_failing`,
//! `break_listeners`) lets tests drive the error paths of the layers above.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use super::{
    ensure_object, generate_id, CollectionSnapshot, Document, DocumentSnapshot, DocumentStore,
    ListenerRegistration, StoredDocument, Subscription,
};
use crate::error::{StoreError, StoreResult};

enum Listener {
    Collection(mpsc::UnboundedSender<StoreResult<CollectionSnapshot>>),
    Document {
        id: String,
        sender: mpsc::UnboundedSender<StoreResult<DocumentSnapshot>>,
    },
}

#[derive(Default)]
struct MemoryState {
    documents: Vec<StoredDocument>,
    listeners: BTreeMap<u64, Listener>,
    next_listener_id: u64,
    failing_writes: usize,
    writes_failing: bool,
    write_count: usize,
}

impl MemoryState {
    fn check_write(&mut self) -> StoreResult<()> {
        if self.writes_failing {
            return Err(StoreError::Unavailable("writes are failing".to_string()));
        }
        if self.failing_writes > 0 {
            self.failing_writes -= 1;
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }
        self.write_count += 1;
        Ok(())
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.documents.iter().position(|doc| doc.id == id)
    }

    fn document_snapshot(&self, id: &str) -> DocumentSnapshot {
        DocumentSnapshot {
            id: id.to_string(),
            data: self
                .position(id)
                .map(|pos| self.documents[pos].data.clone()),
        }
    }

    fn register(&mut self, listener: Listener) -> u64 {
        let id = self.next_listener_id;
        self.next_listener_id = self.next_listener_id.saturating_add(1);
        self.listeners.insert(id, listener);
        id
    }

    /// Push fresh snapshots to the collection listeners and to the listeners
    /// of every document in `changed`
    fn notify(&mut self, changed: &[&str]) {
        let collection = self.documents.clone();
        let mut closed = Vec::new();

        for (listener_id, listener) in &self.listeners {
            let delivered = match listener {
                Listener::Collection(sender) => sender.send(Ok(collection.clone())).is_ok(),
                Listener::Document { id, sender } => {
                    if changed.contains(&id.as_str()) {
                        sender.send(Ok(self.document_snapshot(id))).is_ok()
                    } else {
                        true
                    }
                }
            };
            if !delivered {
                closed.push(*listener_id);
            }
        }

        for listener_id in closed {
            self.listeners.remove(&listener_id);
        }
    }
}

/// In-memory document store
///
/// Cloning yields another handle to the same collection.
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDocumentStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with documents
    pub fn with_documents(documents: Vec<StoredDocument>) -> Self {
        let store = Self::new();
        store.lock().documents = documents;
        store
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a document under a fresh id
    pub fn insert(&self, document: Document) -> StoreResult<String> {
        let id = generate_id();
        ensure_object(&id, &document)?;

        let mut state = self.lock();
        state.check_write()?;
        state.documents.push(StoredDocument {
            id: id.clone(),
            data: document,
        });
        state.notify(&[id.as_str()]);
        debug!(id = %id, "Inserted document");
        Ok(id)
    }

    /// Replace or create the document at `id`
    pub fn put(&self, id: &str, document: Document) -> StoreResult<()> {
        ensure_object(id, &document)?;

        let mut state = self.lock();
        state.check_write()?;
        match state.position(id) {
            Some(pos) => state.documents[pos].data = document,
            None => state.documents.push(StoredDocument {
                id: id.to_string(),
                data: document,
            }),
        }
        state.notify(&[id]);
        Ok(())
    }

    /// Remove the document at `id` if present
    pub fn remove(&self, id: &str) -> StoreResult<()> {
        let mut state = self.lock();
        state.check_write()?;
        if let Some(pos) = state.position(id) {
            state.documents.remove(pos);
            state.notify(&[id]);
        }
        Ok(())
    }

    /// Replace the whole collection, notifying only listeners whose view
    /// actually changed
    pub fn replace_all(&self, documents: Vec<StoredDocument>) {
        let mut state = self.lock();
        if state.documents == documents {
            return;
        }

        let mut changed: Vec<String> = Vec::new();
        for doc in state.documents.iter().chain(documents.iter()) {
            if changed.contains(&doc.id) {
                continue;
            }
            let before = state.documents.iter().find(|d| d.id == doc.id);
            let after = documents.iter().find(|d| d.id == doc.id);
            if before.map(|d| &d.data) != after.map(|d| &d.data) {
                changed.push(doc.id.clone());
            }
        }

        state.documents = documents;
        let changed: Vec<&str> = changed.iter().map(String::as_str).collect();
        state.notify(&changed);
    }

    /// Register a collection listener and deliver the current snapshot
    pub fn watch_collection(&self) -> Subscription<CollectionSnapshot> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut state = self.lock();
        let _ = sender.send(Ok(state.documents.clone()));
        let listener_id = state.register(Listener::Collection(sender));
        drop(state);

        Subscription::new(receiver, self.registration(listener_id))
    }

    /// Register a document listener and deliver the current snapshot
    pub fn watch_document(&self, id: &str) -> Subscription<DocumentSnapshot> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut state = self.lock();
        let _ = sender.send(Ok(state.document_snapshot(id)));
        let listener_id = state.register(Listener::Document {
            id: id.to_string(),
            sender,
        });
        drop(state);

        Subscription::new(receiver, self.registration(listener_id))
    }

    fn registration(&self, listener_id: u64) -> ListenerRegistration {
        let state: Weak<Mutex<MemoryState>> = Arc::downgrade(&self.state);
        ListenerRegistration::new(move || {
            if let Some(state) = state.upgrade() {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                state.listeners.remove(&listener_id);
                debug!(listener_id, "Listener removed");
            }
        })
    }

    /// Fail the next `count` writes with `StoreError::Unavailable`
    pub fn fail_next_writes(&self, count: usize) {
        self.lock().failing_writes = count;
    }

    /// Fail every write until switched off
    pub fn set_writes_failing(&self, failing: bool) {
        self.lock().writes_failing = failing;
    }

    /// Deliver a transport error to every live listener
    pub fn break_listeners(&self, message: &str) {
        let state = self.lock();
        for listener in state.listeners.values() {
            let error = || StoreError::Unavailable(message.to_string());
            match listener {
                Listener::Collection(sender) => {
                    let _ = sender.send(Err(error()));
                }
                Listener::Document { sender, .. } => {
                    let _ = sender.send(Err(error()));
                }
            }
        }
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Number of writes that reached the collection
    pub fn write_count(&self) -> usize {
        self.lock().write_count
    }

    /// Copy of every stored document
    pub fn documents(&self) -> Vec<StoredDocument> {
        self.lock().documents.clone()
    }

    /// Look up one document body
    pub fn get(&self, id: &str) -> Option<Document> {
        self.lock().document_snapshot(id).data
    }

    pub fn len(&self) -> usize {
        self.lock().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn add(&self, document: Document) -> StoreResult<String> {
        self.insert(document)
    }

    async fn set(&self, id: &str, document: Document) -> StoreResult<()> {
        self.put(id, document)
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        self.remove(id)
    }

    async fn subscribe_collection(&self) -> StoreResult<Subscription<CollectionSnapshot>> {
        Ok(self.watch_collection())
    }

    async fn subscribe_document(&self, id: &str) -> StoreResult<Subscription<DocumentSnapshot>> {
        Ok(self.watch_document(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_add_assigns_unique_ids() {
        let store = MemoryDocumentStore::new();
        let a = store.add(json!({"title": "a"})).await.unwrap();
        let b = store.add(json!({"title": "b"})).await.unwrap();

        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&a).unwrap()["title"], "a");
    }

    #[tokio::test]
    async fn test_collection_preserves_insertion_order() {
        let store = MemoryDocumentStore::new();
        let first = store.add(json!({"title": "z"})).await.unwrap();
        let second = store.add(json!({"title": "a"})).await.unwrap();
        store.set(&first, json!({"title": "zz"})).await.unwrap();

        let ids: Vec<_> = store.documents().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[tokio::test]
    async fn test_set_creates_missing_document() {
        let store = MemoryDocumentStore::new();
        store.set("fixed", json!({"title": "x"})).await.unwrap();
        assert!(store.get("fixed").is_some());
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let store = MemoryDocumentStore::new();
        store.delete("nope").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_non_object_documents() {
        let store = MemoryDocumentStore::new();
        let err = store.add(json!("just a string")).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidDocument { .. }));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_collection_subscription_gets_initial_and_changes() {
        let store = MemoryDocumentStore::new();
        let mut sub = store.subscribe_collection().await.unwrap();

        let initial = sub.next_snapshot().await.unwrap().unwrap();
        assert!(initial.is_empty());

        let id = store.add(json!({"title": "a"})).await.unwrap();
        let after_add = sub.next_snapshot().await.unwrap().unwrap();
        assert_eq!(after_add.len(), 1);
        assert_eq!(after_add[0].id, id);

        store.delete(&id).await.unwrap();
        let after_delete = sub.next_snapshot().await.unwrap().unwrap();
        assert!(after_delete.is_empty());
    }

    #[tokio::test]
    async fn test_document_subscription_only_sees_its_document() {
        let store = MemoryDocumentStore::new();
        let id = store.add(json!({"title": "mine"})).await.unwrap();
        let mut sub = store.subscribe_document(&id).await.unwrap();

        let initial = sub.next_snapshot().await.unwrap().unwrap();
        assert!(initial.exists());

        store.add(json!({"title": "other"})).await.unwrap();
        store.delete(&id).await.unwrap();

        let next = sub.next_snapshot().await.unwrap().unwrap();
        assert!(!next.exists());
        assert_eq!(next.id, id);
    }

    #[tokio::test]
    async fn test_dropping_subscription_deregisters() {
        let store = MemoryDocumentStore::new();
        let sub = store.subscribe_collection().await.unwrap();
        let doc_sub = store.subscribe_document("x").await.unwrap();
        assert_eq!(store.listener_count(), 2);

        drop(sub);
        assert_eq!(store.listener_count(), 1);
        doc_sub.cancel();
        assert_eq!(store.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = MemoryDocumentStore::new();
        store.fail_next_writes(1);
        assert!(store.add(json!({})).await.is_err());
        assert!(store.add(json!({})).await.is_ok());

        store.set_writes_failing(true);
        let err = store.delete("x").await.unwrap_err();
        assert!(err.is_transient());
        store.set_writes_failing(false);
        assert!(store.delete("x").await.is_ok());
    }

    #[tokio::test]
    async fn test_break_listeners_delivers_errors() {
        let store = MemoryDocumentStore::new();
        let mut sub = store.subscribe_collection().await.unwrap();
        sub.next_snapshot().await.unwrap().unwrap();

        store.break_listeners("connection reset");
        let err = sub.next_snapshot().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_replace_all_notifies_only_changed_documents() {
        let store = MemoryDocumentStore::with_documents(vec![
            StoredDocument {
                id: "a".to_string(),
                data: json!({"title": "a"}),
            },
            StoredDocument {
                id: "b".to_string(),
                data: json!({"title": "b"}),
            },
        ]);
        let mut sub_a = store.watch_document("a");
        let mut sub_b = store.watch_document("b");
        sub_a.next_snapshot().await.unwrap().unwrap();
        sub_b.next_snapshot().await.unwrap().unwrap();

        store.replace_all(vec![
            StoredDocument {
                id: "a".to_string(),
                data: json!({"title": "a"}),
            },
            StoredDocument {
                id: "b".to_string(),
                data: json!({"title": "b2"}),
            },
        ]);

        let b = sub_b.next_snapshot().await.unwrap().unwrap();
        assert_eq!(b.data.unwrap()["title"], "b2");
        assert!(sub_a.try_next_snapshot().is_none());
    }
}
