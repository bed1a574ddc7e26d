use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// A heading block, as shown in the table of contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub block_id: String,
    pub level: u8,
    pub text: String,
}

/// The editor widget, seen from the coordination layer
pub trait Editor: Send + Sync {
    /// Heading blocks in document order
    fn headings(&self) -> Vec<Heading>;

    /// Lossy markdown export of the current blocks
    fn to_markdown(&self) -> String;
}

struct Attached {
    generation: u64,
    editor: Arc<dyn Editor>,
}

struct Inner {
    slot: Mutex<Option<Attached>>,
    next_generation: AtomicU64,
    generation_tx: watch::Sender<Option<u64>>,
}

impl Inner {
    fn slot(&self) -> MutexGuard<'_, Option<Attached>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, generation: u64) -> bool {
        let mut slot = self.slot();
        if slot.as_ref().map(|a| a.generation) != Some(generation) {
            debug!(
                "Editor generation {} already replaced, nothing to detach",
                generation
            );
            return false;
        }

        *slot = None;
        drop(slot);
        self.generation_tx.send_replace(None);
        info!("Detached editor generation {}", generation);
        true
    }
}

/// Holder of the editor attached to one open document view
///
/// Exactly one editor is attached at a time. Derived UI state (the outline,
/// the markdown export) always reads from the current editor.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl SessionStore {
    pub fn new() -> Self {
        let (generation_tx, _) = watch::channel(None);

        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(None),
                next_generation: AtomicU64::new(1),
                generation_tx,
            }),
        }
    }

    /// Attach the editor of a freshly mounted view
    ///
    /// A previously attached editor is detached first. The returned lease
    /// detaches on drop, however the view is torn down.
    pub fn attach(&self, editor: Arc<dyn Editor>) -> EditorLease {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::AcqRel);

        let previous = self.inner.slot().replace(Attached { generation, editor });
        if let Some(previous) = previous {
            warn!(
                "Editor generation {} still attached, detaching before attaching {}",
                previous.generation, generation
            );
        }

        self.inner.generation_tx.send_replace(Some(generation));
        info!("Attached editor generation {}", generation);

        EditorLease {
            inner: self.inner.clone(),
            generation,
            released: false,
        }
    }

    /// Clear whatever editor is attached
    pub fn detach(&self) {
        let generation = self.inner.slot().as_ref().map(|a| a.generation);
        if let Some(generation) = generation {
            self.inner.release(generation);
        }
    }

    pub fn is_attached(&self) -> bool {
        self.inner.slot().is_some()
    }

    pub fn editor(&self) -> Option<Arc<dyn Editor>> {
        self.inner.slot().as_ref().map(|a| a.editor.clone())
    }

    /// Table of contents of the attached editor; empty when detached
    pub fn outline(&self) -> Vec<Heading> {
        self.editor()
            .map(|editor| editor.headings())
            .unwrap_or_default()
    }

    pub fn markdown(&self) -> Option<String> {
        self.editor().map(|editor| editor.to_markdown())
    }

    /// Generation of the attached editor, `None` while detached
    pub fn subscribe(&self) -> watch::Receiver<Option<u64>> {
        self.inner.generation_tx.subscribe()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped attachment of an editor to a [`SessionStore`]
///
/// Detaches when dropped, unless a newer editor has been attached since.
pub struct EditorLease {
    inner: Arc<Inner>,
    generation: u64,
    released: bool,
}

impl EditorLease {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether this lease's editor is still the attached one
    pub fn is_current(&self) -> bool {
        self.inner
            .slot()
            .as_ref()
            .is_some_and(|a| a.generation == self.generation)
    }

    pub fn detach(mut self) -> bool {
        self.released = true;
        self.inner.release(self.generation)
    }
}

impl Drop for EditorLease {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            self.inner.release(self.generation);
        }
    }
}
