//! Remote document store collaborator
//!
//! The wire protocol is out of scope; this module defines the contract the
//! sync layer consumes — documents keyed by (collection, id), per-field
//! merge updates, and push-style subscriptions — plus an in-memory
//! implementation used by tests and the demo binary.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::StorageError;

/// Collection holding one document per authenticated user.
pub const USER_DATA_COLLECTION: &str = "user_data";

/// A document snapshot pushed to subscribers. `data` is `None` when the
/// document does not (or no longer) exists.
#[derive(Debug, Clone)]
pub struct DocumentEvent {
    pub data: Option<Value>,
}

/// Active push subscription. Unsubscribes when dropped.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Explicitly stop the subscription (equivalent to dropping it).
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// Contract offered by the remote per-user document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a document, replacing any existing one.
    async fn create(&self, collection: &str, id: &str, data: Value) -> Result<(), StorageError>;

    /// Read a document; `None` when absent.
    async fn read(&self, collection: &str, id: &str) -> Result<Option<Value>, StorageError>;

    /// Merge `patch`'s top-level fields into an existing document.
    /// Fails if the document does not exist.
    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<(), StorageError>;

    /// Merge `patch`'s top-level fields, creating the document if needed.
    async fn set_with_merge(
        &self,
        collection: &str,
        id: &str,
        patch: Value,
    ) -> Result<(), StorageError>;

    /// Subscribe to document snapshots. The current snapshot is delivered
    /// immediately, then one event per subsequent write.
    fn subscribe(
        &self,
        collection: &str,
        id: &str,
        sender: mpsc::Sender<DocumentEvent>,
    ) -> Subscription;
}

type DocKey = (String, String);

struct Watcher {
    id: u64,
    sender: mpsc::Sender<DocumentEvent>,
}

#[derive(Default)]
struct MemoryInner {
    documents: HashMap<DocKey, Value>,
    watchers: HashMap<DocKey, Vec<Watcher>>,
    next_watcher_id: u64,
}

impl MemoryInner {
    fn notify(&mut self, key: &DocKey) {
        let snapshot = self.documents.get(key).cloned();
        if let Some(watchers) = self.watchers.get_mut(key) {
            watchers.retain(|w| {
                match w.sender.try_send(DocumentEvent {
                    data: snapshot.clone(),
                }) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        log::debug!("Dropping snapshot for {}/{}: subscriber lagging", key.0, key.1);
                        true
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                }
            });
        }
    }
}

/// Merge `patch`'s top-level fields into `doc`. Non-object documents are
/// replaced wholesale.
fn merge_fields(doc: &mut Value, patch: Value) {
    match (doc, patch) {
        (Value::Object(target), Value::Object(fields)) => {
            for (key, value) in fields {
                target.insert(key, value);
            }
        }
        (doc, patch) => *doc = patch,
    }
}

/// In-memory `DocumentStore` with snapshot fan-out.
#[derive(Default)]
pub struct MemoryDocumentStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(collection: &str, id: &str) -> DocKey {
        (collection.to_string(), id.to_string())
    }

    /// Inspect a document without going through the async trait. Test helper.
    pub fn document(&self, collection: &str, id: &str) -> Option<Value> {
        self.inner
            .lock()
            .documents
            .get(&Self::key(collection, id))
            .cloned()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create(&self, collection: &str, id: &str, data: Value) -> Result<(), StorageError> {
        let key = Self::key(collection, id);
        let mut inner = self.inner.lock();
        inner.documents.insert(key.clone(), data);
        inner.notify(&key);
        Ok(())
    }

    async fn read(&self, collection: &str, id: &str) -> Result<Option<Value>, StorageError> {
        Ok(self
            .inner
            .lock()
            .documents
            .get(&Self::key(collection, id))
            .cloned())
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<(), StorageError> {
        let key = Self::key(collection, id);
        let mut inner = self.inner.lock();
        match inner.documents.get_mut(&key) {
            Some(doc) => merge_fields(doc, patch),
            None => {
                return Err(StorageError::DocumentNotFound {
                    collection: collection.to_string(),
                    id: id.to_string(),
                })
            }
        }
        inner.notify(&key);
        Ok(())
    }

    async fn set_with_merge(
        &self,
        collection: &str,
        id: &str,
        patch: Value,
    ) -> Result<(), StorageError> {
        let key = Self::key(collection, id);
        let mut inner = self.inner.lock();
        match inner.documents.entry(key.clone()) {
            Entry::Occupied(mut entry) => merge_fields(entry.get_mut(), patch),
            Entry::Vacant(entry) => {
                entry.insert(patch);
            }
        }
        inner.notify(&key);
        Ok(())
    }

    fn subscribe(
        &self,
        collection: &str,
        id: &str,
        sender: mpsc::Sender<DocumentEvent>,
    ) -> Subscription {
        let key = Self::key(collection, id);
        let mut inner = self.inner.lock();

        // Deliver the current snapshot right away so new subscribers don't
        // wait for the next write.
        let snapshot = inner.documents.get(&key).cloned();
        let _ = sender.try_send(DocumentEvent { data: snapshot });

        let watcher_id = inner.next_watcher_id;
        inner.next_watcher_id += 1;
        inner
            .watchers
            .entry(key.clone())
            .or_default()
            .push(Watcher {
                id: watcher_id,
                sender,
            });

        let store = Arc::clone(&self.inner);
        Subscription::new(move || {
            let mut inner = store.lock();
            if let Some(watchers) = inner.watchers.get_mut(&key) {
                watchers.retain(|w| w.id != watcher_id);
            }
        })
    }
}
