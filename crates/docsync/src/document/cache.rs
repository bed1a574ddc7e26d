use dashmap::DashMap;
use std::fmt;
use tokio::sync::broadcast;
use tracing::debug;

use super::Document;

/// Logical cache keys shared by every view of the documents
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    /// Single-document view
    Doc(String),
    /// Document list / grid
    DocList,
}

impl QueryKey {
    pub fn doc(id: impl Into<String>) -> Self {
        QueryKey::Doc(id.into())
    }

    /// Broadcast channel key other views of the same resource listen on
    pub fn broadcast_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKey::Doc(id) => write!(f, "doc-{}", id),
            QueryKey::DocList => write!(f, "docs"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    Invalidated(QueryKey),
    Reset(QueryKey),
}

#[derive(Debug, Clone)]
enum CachedValue {
    Document(Document),
    List(Vec<Document>),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CachedValue,
    stale: bool,
}

/// Thread-safe query cache
///
/// Holds the last known server state for the single-document and list views.
/// Invalidation marks entries stale and notifies subscribers, which re-fetch.
pub struct QueryCache {
    entries: DashMap<QueryKey, CacheEntry>,
    event_tx: broadcast::Sender<CacheEvent>,
}

impl QueryCache {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(256);

        Self {
            entries: DashMap::new(),
            event_tx,
        }
    }

    /// Store a fresh copy of a document
    ///
    /// A cached list containing the document is patched in place so list
    /// views show the new title before they re-fetch.
    pub fn put_document(&self, document: Document) {
        if let Some(mut list) = self.entries.get_mut(&QueryKey::DocList) {
            if let CachedValue::List(items) = &mut list.value {
                for item in items.iter_mut().filter(|item| item.id == document.id) {
                    *item = document.clone();
                }
            }
        }

        self.entries.insert(
            QueryKey::Doc(document.id.clone()),
            CacheEntry {
                value: CachedValue::Document(document),
                stale: false,
            },
        );
    }

    pub fn document(&self, id: &str) -> Option<Document> {
        self.entries
            .get(&QueryKey::doc(id))
            .and_then(|entry| match &entry.value {
                CachedValue::Document(doc) => Some(doc.clone()),
                CachedValue::List(_) => None,
            })
    }

    pub fn put_list(&self, documents: Vec<Document>) {
        self.entries.insert(
            QueryKey::DocList,
            CacheEntry {
                value: CachedValue::List(documents),
                stale: false,
            },
        );
    }

    pub fn list(&self) -> Option<Vec<Document>> {
        self.entries
            .get(&QueryKey::DocList)
            .and_then(|entry| match &entry.value {
                CachedValue::List(items) => Some(items.clone()),
                CachedValue::Document(_) => None,
            })
    }

    /// Mark an entry stale and tell subscribers to re-fetch
    pub fn invalidate(&self, key: &QueryKey) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.stale = true;
        }
        debug!("Invalidated query '{}'", key);
        self.emit(CacheEvent::Invalidated(key.clone()));
    }

    /// Drop an entry entirely
    pub fn reset(&self, key: &QueryKey) {
        self.entries.remove(key);
        debug!("Reset query '{}'", key);
        self.emit(CacheEvent::Reset(key.clone()));
    }

    /// Whether an entry is stale; absent entries count as stale
    pub fn is_stale(&self, key: &QueryKey) -> bool {
        self.entries.get(key).map(|entry| entry.stale).unwrap_or(true)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: CacheEvent) {
        if self.event_tx.send(event).is_err() {
            debug!("No cache subscribers");
        }
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}
