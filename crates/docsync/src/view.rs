//! One open document, as seen from one tab or window.
//!
//! A view ties the title controller, the editor session and the
//! collaborative session together, and keeps its title in step with
//! changes other views announce on the broadcast hub.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::autosave::ContentSaver;
use crate::broadcast::ViewId;
use crate::collab::{CollaborativeSession, ProviderStatus};
use crate::config::SyncConfig;
use crate::document::{Document, QueryKey};
use crate::notice::NoticeCenter;
use crate::permission::{resolve_editable, PermissionInputs};
use crate::pipeline::MutationPipeline;
use crate::session::{Editor, EditorLease, Heading, SessionStore};
use crate::title::TitleController;

struct Collaboration {
    session: CollaborativeSession,
    saver: ContentSaver,
}

pub struct DocumentView {
    id: ViewId,
    document_id: String,
    session: SessionStore,
    pipeline: MutationPipeline,
    title: Arc<TitleController>,
    config: SyncConfig,
    collaboration: Option<Collaboration>,
    listener: JoinHandle<()>,
}

impl DocumentView {
    /// Open a view on `document`. Must be called inside a tokio runtime.
    pub fn open(
        document: Document,
        pipeline: MutationPipeline,
        notices: Arc<NoticeCenter>,
        config: &SyncConfig,
    ) -> Self {
        let id = ViewId::new();
        let document_id = document.id.clone();
        let session = SessionStore::new();
        let pipeline = pipeline.with_session(session.clone());
        let title = Arc::new(TitleController::new(
            document,
            pipeline.clone(),
            notices,
            config,
            id,
        ));

        let listener = spawn_listener(id, &document_id, &pipeline, title.clone());
        info!("Opened view {} on document '{}'", id, document_id);

        Self {
            id,
            document_id,
            session,
            pipeline,
            title,
            config: config.clone(),
            collaboration: None,
            listener,
        }
    }

    pub fn id(&self) -> ViewId {
        self.id
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn title(&self) -> &TitleController {
        &self.title
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn pipeline(&self) -> &MutationPipeline {
        &self.pipeline
    }

    /// Attach the content editor of this view
    pub fn attach_editor(&self, editor: Arc<dyn Editor>) -> EditorLease {
        self.session.attach(editor)
    }

    pub fn outline(&self) -> Vec<Heading> {
        self.session.outline()
    }

    /// Bind the collaborative session for this document, replacing and
    /// closing any previous one
    pub async fn bind_session(&mut self, session: CollaborativeSession) {
        if session.document_id() != self.document_id {
            warn!(
                "Binding session of '{}' to view of '{}'",
                session.document_id(),
                self.document_id
            );
        }

        self.unbind_session().await;

        let mut saver = ContentSaver::new(
            &session,
            self.title.subscribe_document(),
            self.pipeline.clone(),
            &self.config,
        );
        saver.start();
        self.collaboration = Some(Collaboration { session, saver });
    }

    pub fn readiness(&self) -> ProviderStatus {
        self.collaboration
            .as_ref()
            .map(|c| c.session.readiness())
            .unwrap_or_default()
    }

    /// Whether the content editor accepts local edits right now
    pub fn editable(&self) -> bool {
        let document = self.title.document();
        resolve_editable(&PermissionInputs::new(
            &document.abilities,
            self.readiness(),
        ))
    }

    /// Save pending content, close the collaborative session and stop
    /// listening for broadcasts
    pub async fn close(&mut self) {
        self.unbind_session().await;
        self.listener.abort();
        info!("Closed view {} on document '{}'", self.id, self.document_id);
    }

    async fn unbind_session(&mut self) {
        if let Some(mut previous) = self.collaboration.take() {
            previous.saver.stop().await;
            previous.session.close();
        }
    }
}

impl Drop for DocumentView {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

fn spawn_listener(
    view: ViewId,
    document_id: &str,
    pipeline: &MutationPipeline,
    title: Arc<TitleController>,
) -> JoinHandle<()> {
    let key = QueryKey::doc(document_id).broadcast_key();
    let mut subscription = pipeline.hub().subscribe(&key);
    let api = pipeline.api().clone();
    let cache = pipeline.cache().clone();
    let document_id = document_id.to_string();

    tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            if event.is_echo_of(&view) {
                debug!("View {} ignoring its own broadcast on '{}'", view, event.key);
                continue;
            }

            match api.get_document(&document_id).await {
                Ok(document) => {
                    cache.put_document(document.clone());
                    title.on_document(&document);
                }
                Err(e) => warn!("Refetch of document '{}' failed: {}", document_id, e),
            }
        }
    })
}
