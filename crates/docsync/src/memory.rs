//! In-memory collaborators.
//!
//! One [`MemoryDocumentApi`] shared between several views behaves like a
//! server seen from several tabs, which is what the tests and the demo need.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::api::DocumentApi;
use crate::bridge::{CreateDocs, HostBridge, SearchHit, UpdateDocs};
use crate::collab::{DocUpdate, SharedDocument, UpdateOrigin};
use crate::document::{Abilities, Document, DocumentPatch};
use crate::error::ApiError;
use crate::session::{Editor, Heading};
use crate::{SyncError, SyncResult};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Document API backed by a map
#[derive(Default)]
pub struct MemoryDocumentApi {
    documents: DashMap<String, Document>,
    patches: Mutex<Vec<(String, DocumentPatch)>>,
    create_calls: AtomicUsize,
    get_calls: AtomicUsize,
    update_calls: AtomicUsize,
    fail_next: Mutex<Option<ApiError>>,
    update_delay: Mutex<Option<Duration>>,
}

impl MemoryDocumentApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, document: Document) {
        self.documents.insert(document.id.clone(), document);
    }

    pub fn document(&self, id: &str) -> Option<Document> {
        self.documents.get(id).map(|entry| entry.value().clone())
    }

    /// Make the next create or update answer with this error
    pub fn fail_next(&self, error: ApiError) {
        *lock(&self.fail_next) = Some(error);
    }

    /// Delay every update, to interleave concurrent callers
    pub fn set_update_delay(&self, delay: Option<Duration>) {
        *lock(&self.update_delay) = delay;
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::Acquire)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::Acquire)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::Acquire)
    }

    pub fn patches(&self) -> Vec<(String, DocumentPatch)> {
        lock(&self.patches).clone()
    }

    fn take_failure(&self) -> Option<ApiError> {
        lock(&self.fail_next).take()
    }
}

#[async_trait]
impl DocumentApi for MemoryDocumentApi {
    async fn create_document(&self) -> SyncResult<Document> {
        self.create_calls.fetch_add(1, Ordering::AcqRel);
        if let Some(error) = self.take_failure() {
            return Err(error.into());
        }

        let now = Utc::now();
        let document = Document {
            created_at: Some(now),
            updated_at: Some(now),
            ..Document::new(Uuid::new_v4().to_string(), "", Abilities::owner())
        };
        self.insert(document.clone());
        Ok(document)
    }

    async fn get_document(&self, id: &str) -> SyncResult<Document> {
        self.get_calls.fetch_add(1, Ordering::AcqRel);
        self.document(id)
            .ok_or_else(|| SyncError::DocumentNotFound { id: id.to_string() })
    }

    async fn update_document(&self, id: &str, patch: &DocumentPatch) -> SyncResult<Document> {
        self.update_calls.fetch_add(1, Ordering::AcqRel);
        lock(&self.patches).push((id.to_string(), patch.clone()));

        let delay = *lock(&self.update_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.take_failure() {
            return Err(error.into());
        }

        let mut entry = self
            .documents
            .get_mut(id)
            .ok_or_else(|| SyncError::DocumentNotFound { id: id.to_string() })?;
        let mut updated = entry.patched(patch);
        updated.updated_at = Some(Utc::now());
        *entry = updated.clone();
        Ok(updated)
    }
}

/// Everything the core asked of the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeCall {
    UpdateDocs(UpdateDocs),
    CreateDocs(CreateDocs),
    Search(String),
    SetupBridge(String),
    StartHistorySyncing,
}

type CallHook = Box<dyn Fn(&BridgeCall) + Send + Sync>;

/// Host bridge that records calls and answers searches from a script
#[derive(Default)]
pub struct RecordingBridge {
    calls: Mutex<Vec<BridgeCall>>,
    failure: Mutex<Option<String>>,
    searches: Mutex<HashMap<String, (Vec<SearchHit>, Option<Duration>)>>,
    hook: Mutex<Option<CallHook>>,
}

impl RecordingBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<BridgeCall> {
        lock(&self.calls).clone()
    }

    pub fn update_calls(&self) -> Vec<UpdateDocs> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BridgeCall::UpdateDocs(data) => Some(data),
                _ => None,
            })
            .collect()
    }

    pub fn search_queries(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BridgeCall::Search(query) => Some(query),
                _ => None,
            })
            .collect()
    }

    /// Every following call fails with this message
    pub fn fail_with(&self, message: impl Into<String>) {
        *lock(&self.failure) = Some(message.into());
    }

    pub fn clear_failure(&self) {
        *lock(&self.failure) = None;
    }

    pub fn script_search(&self, query: &str, hits: Vec<SearchHit>, delay: Option<Duration>) {
        lock(&self.searches).insert(query.to_string(), (hits, delay));
    }

    /// Run `hook` synchronously whenever a call is recorded
    pub fn on_call(&self, hook: impl Fn(&BridgeCall) + Send + Sync + 'static) {
        *lock(&self.hook) = Some(Box::new(hook));
    }

    fn record(&self, call: BridgeCall, operation: &'static str) -> SyncResult<()> {
        if let Some(hook) = lock(&self.hook).as_ref() {
            hook(&call);
        }
        lock(&self.calls).push(call);

        match lock(&self.failure).clone() {
            Some(message) => Err(SyncError::Bridge { operation, message }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl HostBridge for RecordingBridge {
    async fn update_docs(&self, data: UpdateDocs) -> SyncResult<JsonValue> {
        self.record(BridgeCall::UpdateDocs(data), "updateDocs")?;
        Ok(json!({"ok": true}))
    }

    async fn create_docs(&self, data: CreateDocs) -> SyncResult<JsonValue> {
        self.record(BridgeCall::CreateDocs(data), "createDocs")?;
        Ok(json!({"ok": true}))
    }

    async fn search(&self, query: &str) -> SyncResult<Vec<SearchHit>> {
        self.record(BridgeCall::Search(query.to_string()), "search")?;

        let scripted = lock(&self.searches).get(query).cloned();
        let Some((hits, delay)) = scripted else {
            return Ok(Vec::new());
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(hits)
    }

    async fn setup_bridge(&self, target: &str) -> SyncResult<()> {
        self.record(BridgeCall::SetupBridge(target.to_string()), "setupBridge")
    }

    async fn start_history_syncing(&self) -> SyncResult<()> {
        self.record(BridgeCall::StartHistorySyncing, "startHistorySyncing")
    }
}

/// Shared document whose state is a plain string
pub struct MemorySharedDocument {
    state: Mutex<String>,
    update_tx: broadcast::Sender<DocUpdate>,
    close_count: AtomicUsize,
}

impl MemorySharedDocument {
    pub fn new() -> Self {
        let (update_tx, _) = broadcast::channel(64);

        Self {
            state: Mutex::new(String::new()),
            update_tx,
            close_count: AtomicUsize::new(0),
        }
    }

    /// Simulate a keystroke in this view
    pub fn edit_local(&self, state: impl Into<String>) {
        self.apply(state.into(), UpdateOrigin::Local);
    }

    /// Simulate an edit arriving from a collaborator
    pub fn apply_remote(&self, state: impl Into<String>) {
        self.apply(state.into(), UpdateOrigin::Remote);
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::Acquire)
    }

    fn apply(&self, state: String, origin: UpdateOrigin) {
        *lock(&self.state) = state;
        let _ = self.update_tx.send(DocUpdate { origin });
    }
}

impl Default for MemorySharedDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedDocument for MemorySharedDocument {
    fn snapshot(&self) -> String {
        lock(&self.state).clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<DocUpdate> {
        self.update_tx.subscribe()
    }

    fn close(&self) {
        self.close_count.fetch_add(1, Ordering::AcqRel);
    }
}

/// Editor with fixed headings and a settable markdown export
pub struct StaticEditor {
    headings: Vec<Heading>,
    markdown: Mutex<String>,
}

impl StaticEditor {
    pub fn new(headings: Vec<(u8, &str)>, markdown: impl Into<String>) -> Self {
        let headings = headings
            .into_iter()
            .enumerate()
            .map(|(index, (level, text))| Heading {
                block_id: format!("block-{}", index),
                level,
                text: text.to_string(),
            })
            .collect();

        Self {
            headings,
            markdown: Mutex::new(markdown.into()),
        }
    }

    pub fn set_markdown(&self, markdown: impl Into<String>) {
        *lock(&self.markdown) = markdown.into();
    }
}

impl Editor for StaticEditor {
    fn headings(&self) -> Vec<Heading> {
        self.headings.clone()
    }

    fn to_markdown(&self) -> String {
        lock(&self.markdown).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_api_round_trip() {
        let api = MemoryDocumentApi::new();
        let created = api.create_document().await.unwrap();

        let updated = api
            .update_document(&created.id, &DocumentPatch::title("Draft"))
            .await
            .unwrap();
        assert_eq!(updated.title, "Draft");
        assert_eq!(api.get_document(&created.id).await.unwrap().title, "Draft");
        assert_eq!(api.update_calls(), 1);
    }

    #[tokio::test]
    async fn test_memory_api_failure_is_consumed_once() {
        let api = MemoryDocumentApi::new();
        api.insert(Document::new("a", "Draft", Abilities::owner()));
        api.fail_next(ApiError::new("Failed to update the doc", Some(500), vec![]));

        assert!(api.update_document("a", &DocumentPatch::title("x")).await.is_err());
        assert!(api.update_document("a", &DocumentPatch::title("x")).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_document() {
        let api = MemoryDocumentApi::new();
        let err = api.get_document("missing").await.unwrap_err();
        assert!(matches!(err, SyncError::DocumentNotFound { .. }));
    }
}
