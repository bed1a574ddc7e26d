use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinSet;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::collab::{
    CollaborativeSession, DocUpdate, ProviderStatus, SharedDocument, UpdateOrigin,
};
use crate::config::SyncConfig;
use crate::document::{Document, DocumentPatch};
use crate::permission::{resolve_editable, PermissionInputs, WriteAccess};
use crate::pipeline::{Mutation, MutationPipeline};
use crate::SyncResult;

/// Periodically saves local content edits of one collaborative session
///
/// Abilities are read from the latest known document on every save, so a
/// revoked write permission stops saving and a granted one starts it.
pub struct ContentSaver {
    state: Arc<SaverState>,
    save_interval: Duration,
    shutdown: watch::Sender<bool>,
    handles: JoinSet<()>,
}

struct SaverState {
    document_id: String,
    document: watch::Receiver<Document>,
    handle: Arc<dyn SharedDocument>,
    status: watch::Receiver<ProviderStatus>,
    pipeline: MutationPipeline,
    dirty: AtomicBool,
    /// One save in flight at a time, so an older snapshot never lands last
    save_lock: Mutex<()>,
}

impl ContentSaver {
    pub fn new(
        session: &CollaborativeSession,
        document: watch::Receiver<Document>,
        pipeline: MutationPipeline,
        config: &SyncConfig,
    ) -> Self {
        let document_id = document.borrow().id.clone();
        let (shutdown, _) = watch::channel(false);

        Self {
            state: Arc::new(SaverState {
                document_id,
                document,
                handle: session.handle().clone(),
                status: session.subscribe_status(),
                pipeline,
                dirty: AtomicBool::new(false),
                save_lock: Mutex::new(()),
            }),
            save_interval: config.autosave_interval(),
            shutdown,
            handles: JoinSet::new(),
        }
    }

    /// Start listening for edits and the save loop
    pub fn start(&mut self) {
        info!(
            "Starting autosave for document '{}' every {:?}",
            self.state.document_id, self.save_interval
        );

        let state = self.state.clone();
        let mut updates = state.handle.subscribe();
        let mut shutdown = self.shutdown.subscribe();
        self.handles.spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => {
                        state.drain(&mut updates);
                        break;
                    }
                    received = updates.recv() => match received {
                        Ok(update) => state.record(update.origin),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            // some of the skipped updates may have been local
                            debug!("Autosave listener lagged by {} updates", skipped);
                            state.mark_dirty();
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });

        let state = self.state.clone();
        let save_interval = self.save_interval;
        let mut shutdown = self.shutdown.subscribe();
        self.handles.spawn(async move {
            let mut ticker = interval_at(Instant::now() + save_interval, save_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {}
                }

                // outside the select: a save in flight always completes
                match state.flush().await {
                    Ok(true) => info!("Saved content of document '{}'", state.document_id),
                    Ok(false) => {}
                    Err(e) => error!(
                        "Failed to save content of document '{}': {}",
                        state.document_id, e
                    ),
                }
            }
        });
    }

    pub fn is_dirty(&self) -> bool {
        self.state.dirty.load(Ordering::Acquire)
    }

    /// Save now if there are unsaved local edits. Returns whether a save
    /// was sent.
    pub async fn save_now(&self) -> SyncResult<bool> {
        self.state.flush().await
    }

    /// Stop the loop once any save in flight has finished, then perform a
    /// final save
    pub async fn stop(&mut self) {
        info!("Stopping autosave for document '{}'", self.state.document_id);

        self.shutdown.send_replace(true);
        while let Some(result) = self.handles.join_next().await {
            if let Err(e) = result {
                if !e.is_cancelled() {
                    error!("Autosave task error: {}", e);
                }
            }
        }

        if let Err(e) = self.state.flush().await {
            error!(
                "Failed to save content of document '{}' during shutdown: {}",
                self.state.document_id, e
            );
        }
    }
}

impl SaverState {
    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    fn record(&self, origin: UpdateOrigin) {
        if origin == UpdateOrigin::Local {
            self.mark_dirty();
        }
    }

    /// Account for updates already queued when the loop stops
    fn drain(&self, updates: &mut broadcast::Receiver<DocUpdate>) {
        loop {
            match updates.try_recv() {
                Ok(update) => self.record(update.origin),
                Err(broadcast::error::TryRecvError::Lagged(_)) => self.mark_dirty(),
                Err(_) => break,
            }
        }
    }

    async fn flush(&self) -> SyncResult<bool> {
        let _saving = self.save_lock.lock().await;
        if !self.dirty.load(Ordering::Acquire) {
            return Ok(false);
        }

        let document = self.document.borrow().clone();
        let Some(access) = WriteAccess::for_document(&document) else {
            debug!("Document '{}' is read-only, not saving", self.document_id);
            return Ok(false);
        };

        let status = *self.status.borrow();
        if !resolve_editable(&PermissionInputs::new(&document.abilities, status)) {
            debug!(
                "Session for '{}' not ready, postponing save",
                self.document_id
            );
            return Ok(false);
        }

        // cleared before the snapshot so edits made during the save re-mark it
        self.dirty.store(false, Ordering::Release);
        let mutation = Mutation::new(
            &self.document_id,
            DocumentPatch::content(self.handle.snapshot()),
        );

        match self.pipeline.update_document(&access, mutation).await {
            Ok(_) => Ok(true),
            Err(e) => {
                warn!("Content save of '{}' will be retried", self.document_id);
                self.mark_dirty();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Abilities;
    use crate::error::ApiError;
    use crate::memory::MemorySharedDocument;
    use crate::testing::Fixture;

    struct Harness {
        fx: Fixture,
        shared: Arc<MemorySharedDocument>,
        status_tx: watch::Sender<ProviderStatus>,
        doc_tx: watch::Sender<Document>,
        _session: CollaborativeSession,
        saver: ContentSaver,
    }

    fn harness(abilities: Abilities, status: ProviderStatus) -> Harness {
        let fx = Fixture::with_document("42", "Draft", abilities);
        let shared = Arc::new(MemorySharedDocument::new());
        let (status_tx, status_rx) = watch::channel(status);
        let session = CollaborativeSession::open("42", shared.clone(), status_rx);
        let (doc_tx, doc_rx) = watch::channel(fx.api.document("42").unwrap());
        let mut saver = ContentSaver::new(&session, doc_rx, fx.pipeline.clone(), &fx.config);
        saver.start();

        Harness {
            fx,
            shared,
            status_tx,
            doc_tx,
            _session: session,
            saver,
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    async fn next_tick() {
        tokio::time::sleep(Duration::from_millis(1000)).await;
    }

    fn with_abilities(h: &Harness, abilities: Abilities) {
        let mut document = h.fx.api.document("42").unwrap();
        document.abilities = abilities;
        h.fx.api.insert(document.clone());
        h.doc_tx.send_replace(document);
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_edit_is_saved_on_tick() {
        let mut h = harness(Abilities::owner(), ProviderStatus::ready());

        h.shared.edit_local("AAEC");
        settle().await;
        assert!(h.saver.is_dirty());
        assert_eq!(h.fx.api.update_calls(), 0);

        next_tick().await;

        assert_eq!(h.fx.api.document("42").unwrap().content, "AAEC");
        assert_eq!(h.fx.api.update_calls(), 1);
        assert!(!h.saver.is_dirty());
        assert_eq!(h.fx.bridge.update_calls()[0].content.as_deref(), Some("AAEC"));

        // nothing new, nothing sent
        next_tick().await;
        assert_eq!(h.fx.api.update_calls(), 1);
        h.saver.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_edit_is_not_saved() {
        let mut h = harness(Abilities::owner(), ProviderStatus::ready());

        h.shared.apply_remote("AAEC");
        settle().await;
        next_tick().await;

        assert!(!h.saver.is_dirty());
        assert_eq!(h.fx.api.update_calls(), 0);
        h.saver.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_waits_for_ready_session() {
        let mut h = harness(Abilities::owner(), ProviderStatus::connecting());

        h.shared.edit_local("AAEC");
        settle().await;
        next_tick().await;
        assert_eq!(h.fx.api.update_calls(), 0);
        assert!(h.saver.is_dirty());

        h.status_tx.send_replace(ProviderStatus::ready());
        next_tick().await;
        assert_eq!(h.fx.api.update_calls(), 1);
        h.saver.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_only_document_is_never_saved() {
        let mut h = harness(Abilities::reader(), ProviderStatus::ready());

        h.shared.edit_local("AAEC");
        settle().await;
        next_tick().await;

        assert!(!h.saver.save_now().await.unwrap());
        h.saver.stop().await;
        assert_eq!(h.fx.api.update_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_save_is_retried() {
        let mut h = harness(Abilities::owner(), ProviderStatus::ready());
        h.fx
            .api
            .fail_next(ApiError::new("Failed to update the doc", Some(503), vec![]));

        h.shared.edit_local("AAEC");
        settle().await;
        next_tick().await;
        assert_eq!(h.fx.api.update_calls(), 1);
        assert!(h.saver.is_dirty());

        next_tick().await;
        assert_eq!(h.fx.api.update_calls(), 2);
        assert!(!h.saver.is_dirty());
        assert_eq!(h.fx.api.document("42").unwrap().content, "AAEC");
        h.saver.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_flushes_pending_edit() {
        let mut h = harness(Abilities::owner(), ProviderStatus::ready());

        h.shared.edit_local("AAEC");
        settle().await;
        h.saver.stop().await;

        assert_eq!(h.fx.api.update_calls(), 1);
        assert_eq!(h.fx.api.document("42").unwrap().content, "AAEC");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_save_in_flight() {
        let mut h = harness(Abilities::owner(), ProviderStatus::ready());
        h.fx.api.set_update_delay(Some(Duration::from_millis(500)));

        h.shared.edit_local("AAEC");
        settle().await;
        // the tick at 1s starts a save that answers at 1.5s
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(!h.saver.is_dirty());

        h.saver.stop().await;

        assert_eq!(h.fx.api.update_calls(), 1);
        assert_eq!(h.fx.api.document("42").unwrap().content, "AAEC");
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_queued_at_stop_is_flushed() {
        let mut h = harness(Abilities::owner(), ProviderStatus::ready());

        h.shared.edit_local("AAEC");
        h.saver.stop().await;

        assert_eq!(h.fx.api.document("42").unwrap().content, "AAEC");
    }

    #[tokio::test(start_paused = true)]
    async fn test_revoked_write_access_stops_saving() {
        let mut h = harness(Abilities::owner(), ProviderStatus::ready());

        h.shared.edit_local("AAEC");
        settle().await;
        with_abilities(&h, Abilities::reader());
        next_tick().await;
        assert_eq!(h.fx.api.update_calls(), 0);

        h.saver.stop().await;
        assert_eq!(h.fx.api.update_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_granted_write_access_starts_saving() {
        let mut h = harness(Abilities::reader(), ProviderStatus::ready());

        h.shared.edit_local("AAEC");
        settle().await;
        next_tick().await;
        assert_eq!(h.fx.api.update_calls(), 0);

        with_abilities(&h, Abilities::owner());
        next_tick().await;

        assert_eq!(h.fx.api.update_calls(), 1);
        assert_eq!(h.fx.api.document("42").unwrap().content, "AAEC");
        h.saver.stop().await;
    }
}
