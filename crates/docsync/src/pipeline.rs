use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::api::DocumentApi;
use crate::bridge::BridgeSynchronizer;
use crate::broadcast::{BroadcastHub, ViewId};
use crate::config::SyncConfig;
use crate::document::{Document, DocumentPatch, QueryCache, QueryKey};
use crate::permission::WriteAccess;
use crate::session::SessionStore;
use crate::{SyncError, SyncResult};

/// Follow-up step run after a successful mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    InvalidateCache(Vec<QueryKey>),
    /// Tell the host what changed, derived from the patched fields
    NotifyBridge,
    Broadcast {
        key: String,
        origin: Option<ViewId>,
    },
}

/// A metadata change and the effects to run once the server accepted it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub document_id: String,
    pub patch: DocumentPatch,
    pub effects: Vec<Effect>,
}

impl Mutation {
    /// Mutation with the default effects: invalidate the document and list
    /// queries, then notify the bridge
    pub fn new(document_id: impl Into<String>, patch: DocumentPatch) -> Self {
        let document_id = document_id.into();
        let effects = MutationPipeline::default_effects(&document_id);

        Self {
            document_id,
            patch,
            effects,
        }
    }

    /// Append an effect after the defaults
    pub fn then(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Runs document mutations: optimistic cache write, one API round-trip, then
/// the post-commit effects strictly in order.
///
/// The pipeline never retries and never serializes callers; two concurrent
/// updates race and whichever response resolves last wins in the cache.
#[derive(Clone)]
pub struct MutationPipeline {
    api: Arc<dyn DocumentApi>,
    cache: Arc<QueryCache>,
    bridge: BridgeSynchronizer,
    hub: Arc<BroadcastHub>,
    session: Option<SessionStore>,
    default_dir_id: String,
}

impl MutationPipeline {
    pub fn new(
        api: Arc<dyn DocumentApi>,
        cache: Arc<QueryCache>,
        bridge: BridgeSynchronizer,
        hub: Arc<BroadcastHub>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            api,
            cache,
            bridge,
            hub,
            session: None,
            default_dir_id: config.default_dir_id.clone(),
        }
    }

    /// Read the markdown export for content sync from this view's editor
    pub fn with_session(mut self, session: SessionStore) -> Self {
        self.session = Some(session);
        self
    }

    pub fn default_effects(document_id: &str) -> Vec<Effect> {
        vec![
            Effect::InvalidateCache(vec![QueryKey::doc(document_id), QueryKey::DocList]),
            Effect::NotifyBridge,
        ]
    }

    pub fn api(&self) -> &Arc<dyn DocumentApi> {
        &self.api
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    pub async fn update_document(
        &self,
        access: &WriteAccess,
        mutation: Mutation,
    ) -> SyncResult<Document> {
        self.update_document_with(access, mutation, |_| {}).await
    }

    /// Update a document, then call `on_success` after every effect was issued
    pub async fn update_document_with<F>(
        &self,
        access: &WriteAccess,
        mutation: Mutation,
        on_success: F,
    ) -> SyncResult<Document>
    where
        F: FnOnce(&Document),
    {
        let Mutation {
            document_id,
            patch,
            effects,
        } = mutation;

        if access.document_id() != document_id {
            debug_assert!(
                false,
                "write access for '{}' used on document '{}'",
                access.document_id(),
                document_id
            );
            return Err(SyncError::ReadOnly { document_id });
        }

        if let Some(cached) = self.cache.document(&document_id) {
            self.cache.put_document(cached.patched(&patch));
        }

        let document = self
            .api
            .update_document(&document_id, &patch)
            .await
            .inspect_err(|e| warn!("Update of document '{}' failed: {}", document_id, e))?;

        self.cache.put_document(document.clone());

        for effect in &effects {
            if let Err(e) = self.run_effect(effect, &document, &patch).await {
                error!(
                    "Effect {:?} after updating document '{}' failed: {}",
                    effect, document.id, e
                );
            }
        }

        on_success(&document);
        Ok(document)
    }

    /// Create a document and register it in the host folder `dir_id`
    pub async fn create_document(&self, dir_id: Option<&str>) -> SyncResult<Document> {
        let document = self
            .api
            .create_document()
            .await
            .inspect_err(|e| warn!("Document creation failed: {}", e))?;

        info!("Created document '{}'", document.id);

        let dir_id = dir_id.unwrap_or(&self.default_dir_id);
        if let Err(e) = self.bridge.notify_created(dir_id, &document.id).await {
            error!(
                "Host was not told about document '{}' in '{}': {}",
                document.id, dir_id, e
            );
        }

        self.cache.reset(&QueryKey::DocList);
        self.cache.put_document(document.clone());
        Ok(document)
    }

    async fn run_effect(
        &self,
        effect: &Effect,
        document: &Document,
        patch: &DocumentPatch,
    ) -> SyncResult<()> {
        match effect {
            Effect::InvalidateCache(keys) => {
                keys.iter().for_each(|key| self.cache.invalidate(key));
                Ok(())
            }
            Effect::NotifyBridge => self.notify_bridge(document, patch).await,
            Effect::Broadcast { key, origin } => {
                let receivers = match origin {
                    Some(origin) => self.hub.broadcast_from(key, *origin),
                    None => self.hub.broadcast(key),
                };
                debug!("Broadcast '{}' reached {} views", key, receivers);
                Ok(())
            }
        }
    }

    async fn notify_bridge(&self, document: &Document, patch: &DocumentPatch) -> SyncResult<()> {
        let mut first_error = None;

        if patch.title.is_some() {
            if let Err(e) = self.bridge.notify_renamed(&document.id, &document.title).await {
                first_error.get_or_insert(e);
            }
        }

        if let Some(content) = &patch.content {
            let markdown = self
                .session
                .as_ref()
                .and_then(|session| session.markdown())
                .unwrap_or_else(|| content.clone());

            if let Err(e) = self.bridge.notify_content_sync(&document.id, &markdown).await {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
