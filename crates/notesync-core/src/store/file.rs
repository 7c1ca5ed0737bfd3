//! File-backed document store
//!
//! Persists the collection as a JSON array of `{id, data}` entries and keeps
//! an in-memory mirror that serves subscriptions. Writes are atomic (unique
//! temp file, then rename).
//!
//! Other processes may write the same file. Each read-modify-write cycle
//! holds an advisory lock on a sibling `.lock` file and refreshes the mirror
//! from disk first, so concurrent writers never lose each other's documents.
//! An optional background poller picks up foreign writes so live listeners
//! see them. Writes to the same document are last writer wins.
//!
//! File work is blocking and runs on Tokio's blocking pool.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use fd_lock::RwLock;
use tempfile::NamedTempFile;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{
    ensure_object, generate_id, CollectionSnapshot, Document, DocumentSnapshot, DocumentStore,
    MemoryDocumentStore, StoredDocument, Subscription,
};
use crate::config::Config;
use crate::error::{StoreError, StoreResult};

struct FileShared {
    path: PathBuf,
    lock_path: PathBuf,
    mirror: MemoryDocumentStore,
    /// Bytes last read from or written to `path`
    last_seen: Mutex<Option<Vec<u8>>>,
    /// Serializes file cycles within this process
    cycle_lock: tokio::sync::Mutex<()>,
}

impl FileShared {
    /// Bring the mirror up to date with the file on disk
    fn refresh(&self) -> StoreResult<()> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(StoreError::from_io(e, self.path.clone())),
        };

        let mut last_seen = self.last_seen.lock().unwrap_or_else(PoisonError::into_inner);
        if *last_seen == bytes {
            return Ok(());
        }

        let documents = match &bytes {
            Some(bytes) => parse_documents(bytes)?,
            None => Vec::new(),
        };
        debug!(path = ?self.path, count = documents.len(), "Reloaded notes file");
        self.mirror.replace_all(documents);
        *last_seen = bytes;
        Ok(())
    }

    /// Apply `change` to the on-disk collection under the cross-process lock
    ///
    /// `change` returns whether anything changed; nothing is written when it
    /// did not.
    fn modify(&self, change: impl FnOnce(&mut Vec<StoredDocument>) -> bool) -> StoreResult<()> {
        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::from_io(e, parent.to_path_buf()))?;
        }
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| StoreError::from_io(e, self.lock_path.clone()))?;
        let mut lock = RwLock::new(lock_file);
        let _guard = lock
            .write()
            .map_err(|e| StoreError::from_io(e, self.lock_path.clone()))?;

        self.refresh()?;
        let mut documents = self.mirror.documents();
        if change(&mut documents) {
            self.commit(documents)?;
        }
        Ok(())
    }

    /// Persist `documents` and publish them to the mirror
    fn commit(&self, documents: Vec<StoredDocument>) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(&documents)?;
        atomic_write(&self.path, &bytes)?;
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = Some(bytes);
        self.mirror.replace_all(documents);
        Ok(())
    }
}

/// Run blocking file work on the blocking pool, one cycle at a time per store
async fn run_blocking<T, F>(shared: &Arc<FileShared>, work: F) -> StoreResult<T>
where
    T: Send + 'static,
    F: FnOnce(&FileShared) -> StoreResult<T> + Send + 'static,
{
    let _guard = shared.cycle_lock.lock().await;
    let shared = Arc::clone(shared);
    tokio::task::spawn_blocking(move || work(&shared))
        .await
        .map_err(|e| StoreError::Unavailable(format!("file task failed: {}", e)))?
}

/// Document store persisted to a JSON file
pub struct FileDocumentStore {
    shared: Arc<FileShared>,
    poller: Option<JoinHandle<()>>,
}

impl FileDocumentStore {
    /// Open the store described by `config`
    ///
    /// Starts the background poller when `poll_interval_ms` is non-zero, which
    /// requires a Tokio runtime.
    pub fn open(config: &Config) -> StoreResult<Self> {
        let store = Self::open_at(config.notes_path())?;
        match config.poll_interval() {
            Some(interval) => Ok(store.with_polling(interval)),
            None => Ok(store),
        }
    }

    /// Open (or lazily create) the store at `path` without polling
    pub fn open_at(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let shared = Arc::new(FileShared {
            lock_path: path.with_extension("lock"),
            path,
            mirror: MemoryDocumentStore::new(),
            last_seen: Mutex::new(None),
            cycle_lock: tokio::sync::Mutex::new(()),
        });
        shared.refresh()?;
        info!(path = ?shared.path, count = shared.mirror.len(), "Opened notes file");

        Ok(Self {
            shared,
            poller: None,
        })
    }

    /// Re-read the file every `interval` to pick up foreign writes
    pub fn with_polling(mut self, interval: Duration) -> Self {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
        let shared = Arc::clone(&self.shared);
        self.poller = Some(tokio::spawn(poll_task(shared, interval)));
        self
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Number of documents currently mirrored
    pub fn len(&self) -> usize {
        self.shared.mirror.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for FileDocumentStore {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }
}

async fn poll_task(shared: Arc<FileShared>, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        if let Err(e) = run_blocking(&shared, FileShared::refresh).await {
            if e.is_transient() {
                warn!(path = ?shared.path, "Failed to reload notes file: {}", e);
            } else {
                error!(path = ?shared.path, "Notes file unreadable: {}", e);
            }
        }
    }
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    async fn add(&self, document: Document) -> StoreResult<String> {
        let id = generate_id();
        ensure_object(&id, &document)?;

        let entry = StoredDocument {
            id: id.clone(),
            data: document,
        };
        run_blocking(&self.shared, move |shared| {
            shared.modify(|documents| {
                documents.push(entry);
                true
            })
        })
        .await?;
        Ok(id)
    }

    async fn set(&self, id: &str, document: Document) -> StoreResult<()> {
        ensure_object(id, &document)?;

        let id = id.to_string();
        run_blocking(&self.shared, move |shared| {
            shared.modify(|documents| {
                match documents.iter_mut().find(|doc| doc.id == id) {
                    Some(existing) => existing.data = document,
                    None => documents.push(StoredDocument { id, data: document }),
                }
                true
            })
        })
        .await
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        let id = id.to_string();
        run_blocking(&self.shared, move |shared| {
            shared.modify(|documents| {
                let before = documents.len();
                documents.retain(|doc| doc.id != id);
                documents.len() != before
            })
        })
        .await
    }

    async fn subscribe_collection(&self) -> StoreResult<Subscription<CollectionSnapshot>> {
        run_blocking(&self.shared, |shared| {
            shared.refresh()?;
            Ok(shared.mirror.watch_collection())
        })
        .await
    }

    async fn subscribe_document(&self, id: &str) -> StoreResult<Subscription<DocumentSnapshot>> {
        let id = id.to_string();
        run_blocking(&self.shared, move |shared| {
            shared.refresh()?;
            Ok(shared.mirror.watch_document(&id))
        })
        .await
    }
}

fn parse_documents(bytes: &[u8]) -> StoreResult<Vec<StoredDocument>> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    let documents: Vec<StoredDocument> = serde_json::from_slice(bytes)?;
    for doc in &documents {
        ensure_object(&doc.id, &doc.data)?;
    }
    Ok(documents)
}

/// Write data to a file atomically
///
/// Writes a uniquely named sibling temp file, syncs it, then renames it over
/// `path`, so the target is never left partially written and concurrent
/// writers never share a temp file.
fn atomic_write(path: &Path, data: &[u8]) -> StoreResult<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| StoreError::from_io(e, parent.to_path_buf()))?;

    let mut file =
        NamedTempFile::new_in(parent).map_err(|e| StoreError::from_io(e, parent.to_path_buf()))?;
    file.write_all(data)
        .map_err(|e| StoreError::from_io(e, file.path().to_path_buf()))?;
    file.as_file()
        .sync_all()
        .map_err(|e| StoreError::from_io(e, file.path().to_path_buf()))?;

    file.persist(path)
        .map_err(|e| StoreError::from_io(e.error, path.to_path_buf()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn notes_path(temp_dir: &TempDir) -> PathBuf {
        temp_dir.path().join("notes.json")
    }

    #[tokio::test]
    async fn test_open_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileDocumentStore::open_at(notes_path(&temp_dir)).unwrap();
        assert!(store.is_empty());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_data_persists_across_reopens() {
        let temp_dir = TempDir::new().unwrap();
        let id;
        {
            let store = FileDocumentStore::open_at(notes_path(&temp_dir)).unwrap();
            id = store.add(json!({"title": "Persistent"})).await.unwrap();
            store.add(json!({"title": "Second"})).await.unwrap();
        }

        let store = FileDocumentStore::open_at(notes_path(&temp_dir)).unwrap();
        assert_eq!(store.len(), 2);

        let mut sub = store.subscribe_document(&id).await.unwrap();
        let snapshot = sub.next_snapshot().await.unwrap().unwrap();
        assert_eq!(snapshot.data.unwrap()["title"], "Persistent");
    }

    #[tokio::test]
    async fn test_set_and_delete_are_persisted() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileDocumentStore::open_at(notes_path(&temp_dir)).unwrap();
        let id = store.add(json!({"title": "a"})).await.unwrap();
        store.set(&id, json!({"title": "b"})).await.unwrap();

        let content = fs::read_to_string(store.path()).unwrap();
        assert!(content.contains("\"b\""));

        store.delete(&id).await.unwrap();
        store.delete(&id).await.unwrap();
        let reopened = FileDocumentStore::open_at(notes_path(&temp_dir)).unwrap();
        assert!(reopened.is_empty());
    }

    #[tokio::test]
    async fn test_writes_refresh_from_disk_first() {
        let temp_dir = TempDir::new().unwrap();
        let first = FileDocumentStore::open_at(notes_path(&temp_dir)).unwrap();
        let second = FileDocumentStore::open_at(notes_path(&temp_dir)).unwrap();

        first.add(json!({"title": "from first"})).await.unwrap();
        second.add(json!({"title": "from second"})).await.unwrap();

        let reopened = FileDocumentStore::open_at(notes_path(&temp_dir)).unwrap();
        assert_eq!(reopened.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_keep_every_document() {
        let temp_dir = TempDir::new().unwrap();
        let first = Arc::new(FileDocumentStore::open_at(notes_path(&temp_dir)).unwrap());
        let second = Arc::new(FileDocumentStore::open_at(notes_path(&temp_dir)).unwrap());

        let mut tasks = Vec::new();
        for i in 0..40 {
            let store = if i % 2 == 0 {
                Arc::clone(&first)
            } else {
                Arc::clone(&second)
            };
            tasks.push(tokio::spawn(async move {
                store.add(json!({"title": format!("note {}", i)})).await
            }));
        }

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().unwrap());
        }

        let reopened = FileDocumentStore::open_at(notes_path(&temp_dir)).unwrap();
        assert_eq!(reopened.len(), 40);
        let stored: Vec<String> = reopened
            .shared
            .mirror
            .documents()
            .into_iter()
            .map(|doc| doc.id)
            .collect();
        for id in &ids {
            assert!(stored.contains(id));
        }
    }

    #[tokio::test]
    async fn test_poller_delivers_foreign_writes() {
        let temp_dir = TempDir::new().unwrap();
        let watcher = FileDocumentStore::open_at(notes_path(&temp_dir))
            .unwrap()
            .with_polling(Duration::from_millis(20));
        let writer = FileDocumentStore::open_at(notes_path(&temp_dir)).unwrap();

        let mut sub = watcher.subscribe_collection().await.unwrap();
        assert!(sub.next_snapshot().await.unwrap().unwrap().is_empty());

        writer.add(json!({"title": "hello"})).await.unwrap();

        let snapshot = tokio::time::timeout(Duration::from_secs(5), sub.next_snapshot())
            .await
            .expect("poller should pick up the write")
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].data["title"], "hello");
    }

    #[tokio::test]
    async fn test_corrupt_file_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = notes_path(&temp_dir);
        fs::write(&path, "not json").unwrap();

        let err = FileDocumentStore::open_at(&path).err().unwrap();
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let nested_path = temp_dir.path().join("a").join("b").join("notes.json");

        atomic_write(&nested_path, b"[]").unwrap();

        assert_eq!(fs::read_to_string(&nested_path).unwrap(), "[]");
        let entries: Vec<_> = fs::read_dir(nested_path.parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("notes.json")]);
    }
}
