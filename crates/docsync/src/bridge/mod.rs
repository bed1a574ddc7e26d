//! One-way notifier toward the host file-management application.
//!
//! The host injects its bridge when it boots the editor. Here that object is
//! an explicit [`HostBridge`] handed to [`BridgeSynchronizer`] at construction,
//! so the core runs against a recording bridge in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{debug, error};

use crate::{SyncError, SyncResult};

pub mod mention;
pub mod search;

pub use mention::{FileKind, FileMention, MentionSuggestion};
pub use search::{SearchOutcome, SearchSession};

/// Payload of the host's `updateDocs` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDocs {
    pub docs_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Payload of the host's `createDocs` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDocs {
    pub dir_id: String,
    pub external_id: String,
}

/// File metadata attached to a search hit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitDoc {
    #[serde(default)]
    pub mime: Option<String>,
}

/// One result of the host's file search
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchHit {
    pub title: Option<String>,
    pub url: Option<String>,
    pub doc: Option<HitDoc>,
    pub slug: Option<String>,
    pub sub_title: Option<String>,
    pub secondary_url: Option<String>,
}

impl SearchHit {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            url: Some(url.into()),
            ..Self::default()
        }
    }
}

/// Contract the host application exposes to the editor
#[async_trait]
pub trait HostBridge: Send + Sync {
    async fn update_docs(&self, data: UpdateDocs) -> SyncResult<JsonValue>;

    async fn create_docs(&self, data: CreateDocs) -> SyncResult<JsonValue>;

    async fn search(&self, query: &str) -> SyncResult<Vec<SearchHit>>;

    /// Called by the host bootstrap, never by this crate
    async fn setup_bridge(&self, target: &str) -> SyncResult<()>;

    /// Called by the host bootstrap, never by this crate
    async fn start_history_syncing(&self) -> SyncResult<()>;
}

/// Document lifecycle events forwarded to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeNotification {
    DocumentCreated { dir_id: String, external_id: String },
    DocumentRenamed { doc_id: String, name: String },
    DocumentContentSync { doc_id: String, content: String },
    /// The only round-trip; answered with [`BridgeReply::Results`]
    SearchQuery { text: String },
}

impl BridgeNotification {
    fn operation(&self) -> &'static str {
        match self {
            BridgeNotification::DocumentCreated { .. } => "createDocs",
            BridgeNotification::DocumentRenamed { .. }
            | BridgeNotification::DocumentContentSync { .. } => "updateDocs",
            BridgeNotification::SearchQuery { .. } => "search",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BridgeReply {
    Ack(JsonValue),
    Results(Vec<SearchHit>),
}

/// Boundary adapter over an optional host bridge
#[derive(Clone)]
pub struct BridgeSynchronizer {
    bridge: Option<Arc<dyn HostBridge>>,
}

impl BridgeSynchronizer {
    pub fn new(bridge: Arc<dyn HostBridge>) -> Self {
        Self {
            bridge: Some(bridge),
        }
    }

    /// A synchronizer with no host behind it
    ///
    /// Every call is a programming error: it panics in debug builds and
    /// returns [`SyncError::BridgeUnavailable`] in release builds.
    pub fn absent() -> Self {
        Self { bridge: None }
    }

    pub fn is_present(&self) -> bool {
        self.bridge.is_some()
    }

    pub async fn notify_created(&self, dir_id: &str, external_id: &str) -> SyncResult<()> {
        self.dispatch(&BridgeNotification::DocumentCreated {
            dir_id: dir_id.to_string(),
            external_id: external_id.to_string(),
        })
        .await
        .map(|_| ())
    }

    pub async fn notify_renamed(&self, doc_id: &str, name: &str) -> SyncResult<()> {
        self.dispatch(&BridgeNotification::DocumentRenamed {
            doc_id: doc_id.to_string(),
            name: name.to_string(),
        })
        .await
        .map(|_| ())
    }

    pub async fn notify_content_sync(&self, doc_id: &str, content: &str) -> SyncResult<()> {
        self.dispatch(&BridgeNotification::DocumentContentSync {
            doc_id: doc_id.to_string(),
            content: content.to_string(),
        })
        .await
        .map(|_| ())
    }

    pub async fn search(&self, query: &str) -> SyncResult<Vec<SearchHit>> {
        match self
            .dispatch(&BridgeNotification::SearchQuery {
                text: query.to_string(),
            })
            .await?
        {
            BridgeReply::Results(hits) => Ok(hits),
            BridgeReply::Ack(_) => Ok(Vec::new()),
        }
    }

    /// Send one notification to the host
    pub async fn dispatch(&self, notification: &BridgeNotification) -> SyncResult<BridgeReply> {
        let operation = notification.operation();
        let bridge = self.bridge(operation)?;

        debug!(target: "docsync::bridge", "Dispatching {:?}", notification);

        let result = match notification {
            BridgeNotification::DocumentCreated {
                dir_id,
                external_id,
            } => bridge
                .create_docs(CreateDocs {
                    dir_id: dir_id.clone(),
                    external_id: external_id.clone(),
                })
                .await
                .map(BridgeReply::Ack),
            BridgeNotification::DocumentRenamed { doc_id, name } => bridge
                .update_docs(UpdateDocs {
                    docs_id: doc_id.clone(),
                    content: None,
                    name: Some(name.clone()),
                })
                .await
                .map(BridgeReply::Ack),
            BridgeNotification::DocumentContentSync { doc_id, content } => bridge
                .update_docs(UpdateDocs {
                    docs_id: doc_id.clone(),
                    content: Some(content.clone()),
                    name: None,
                })
                .await
                .map(BridgeReply::Ack),
            BridgeNotification::SearchQuery { text } => {
                bridge.search(text).await.map(BridgeReply::Results)
            }
        };

        result.map_err(|e| {
            let e = match e {
                e if e.is_bridge() => e,
                other => SyncError::Bridge {
                    operation,
                    message: other.to_string(),
                },
            };
            error!(target: "docsync::bridge", "Host bridge {} failed: {}", operation, e);
            e
        })
    }

    fn bridge(&self, operation: &'static str) -> SyncResult<&Arc<dyn HostBridge>> {
        match &self.bridge {
            Some(bridge) => Ok(bridge),
            None => {
                debug_assert!(
                    false,
                    "host bridge must be injected before calling {}",
                    operation
                );
                error!(target: "docsync::bridge", "Host bridge absent for {}", operation);
                Err(SyncError::BridgeUnavailable { operation })
            }
        }
    }
}
