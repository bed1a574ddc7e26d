use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::info;

use crate::{SyncError, SyncResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOrigin {
    /// Edit typed in this view
    Local,
    /// Edit received from a collaborator through the provider
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocUpdate {
    pub origin: UpdateOrigin,
}

/// Handle to the collaboratively synchronized content tree
///
/// The CRDT engine behind it is opaque: this crate reads snapshots and
/// listens for changes, nothing more.
pub trait SharedDocument: Send + Sync {
    /// Encoded current state, as stored in `Document::content`
    fn snapshot(&self) -> String;

    fn subscribe(&self) -> broadcast::Receiver<DocUpdate>;

    /// Close the provider connection and drop listeners
    fn close(&self);
}

/// Readiness of the real-time provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProviderStatus {
    pub synced: bool,
    pub loading: bool,
}

impl ProviderStatus {
    pub fn connecting() -> Self {
        Self {
            synced: false,
            loading: true,
        }
    }

    pub fn ready() -> Self {
        Self {
            synced: true,
            loading: false,
        }
    }
}

/// Binds a document to its shared content handle for one open view
///
/// The handle is closed exactly once, on `close()` or on drop.
pub struct CollaborativeSession {
    document_id: String,
    handle: Arc<dyn SharedDocument>,
    status: watch::Receiver<ProviderStatus>,
    closed: AtomicBool,
}

impl CollaborativeSession {
    pub fn open(
        document_id: impl Into<String>,
        handle: Arc<dyn SharedDocument>,
        status: watch::Receiver<ProviderStatus>,
    ) -> Self {
        let document_id = document_id.into();
        info!("Opened collaborative session for document '{}'", document_id);

        Self {
            document_id,
            handle,
            status,
            closed: AtomicBool::new(false),
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn handle(&self) -> &Arc<dyn SharedDocument> {
        &self.handle
    }

    pub fn readiness(&self) -> ProviderStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ProviderStatus> {
        self.status.clone()
    }

    /// Wait until the provider stops loading
    pub async fn wait_ready(&self) -> SyncResult<ProviderStatus> {
        let mut rx = self.status.clone();
        let status = rx
            .wait_for(|status| !status.loading)
            .await
            .map_err(|_| SyncError::Internal("collaboration provider went away".to_string()))?;
        Ok(*status)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.handle.close();
            info!("Closed collaborative session for document '{}'", self.document_id);
        }
    }
}

impl Drop for CollaborativeSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySharedDocument;
    use std::time::Duration;

    #[test]
    fn test_close_once_on_drop() {
        let handle = Arc::new(MemorySharedDocument::new());
        let (_tx, rx) = watch::channel(ProviderStatus::ready());

        {
            let session = CollaborativeSession::open("doc-1", handle.clone(), rx);
            session.close();
            assert!(session.is_closed());
        }

        assert_eq!(handle.close_count(), 1);
    }

    #[test]
    fn test_drop_closes_on_error_path() {
        fn fails_after_open(handle: Arc<MemorySharedDocument>) -> SyncResult<()> {
            let (_tx, rx) = watch::channel(ProviderStatus::connecting());
            let _session = CollaborativeSession::open("doc-1", handle, rx);
            Err(SyncError::Internal("render failed".to_string()))
        }

        let handle = Arc::new(MemorySharedDocument::new());
        assert!(fails_after_open(handle.clone()).is_err());
        assert_eq!(handle.close_count(), 1);
    }

    #[tokio::test]
    async fn test_wait_ready() {
        let handle = Arc::new(MemorySharedDocument::new());
        let (tx, rx) = watch::channel(ProviderStatus::connecting());
        let session = CollaborativeSession::open("doc-1", handle, rx);
        assert!(session.readiness().loading);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            tx.send_replace(ProviderStatus::ready());
            // keep the sender alive until the waiter has seen the value
            tokio::time::sleep(Duration::from_millis(50)).await;
        });

        let status = session.wait_ready().await.unwrap();
        assert!(status.synced);
        assert!(!session.readiness().loading);
    }

    #[tokio::test]
    async fn test_wait_ready_errors_when_provider_dropped() {
        let handle = Arc::new(MemorySharedDocument::new());
        let (tx, rx) = watch::channel(ProviderStatus::connecting());
        let session = CollaborativeSession::open("doc-1", handle, rx);
        drop(tx);

        assert!(session.wait_ready().await.is_err());
    }
}
