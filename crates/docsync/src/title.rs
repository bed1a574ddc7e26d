//! Editable document title.
//!
//! Keystrokes only touch the displayed draft. A commit sanitizes the draft
//! and, when it differs from the persisted title, sends it through the
//! mutation pipeline. Commits are queued so a second one starts only after
//! the first has its response.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::broadcast::ViewId;
use crate::config::{EmptyTitlePolicy, SyncConfig};
use crate::document::{Document, DocumentPatch, QueryKey};
use crate::notice::NoticeCenter;
use crate::permission::WriteAccess;
use crate::pipeline::{Effect, Mutation, MutationPipeline};
use crate::SyncResult;

/// Trim, then drop every line break
pub fn sanitize_title(input: &str) -> String {
    input
        .trim()
        .chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TitleState {
    /// The user may not rename this document
    ReadOnly { title: String },
    Idle { display: String },
    Editing { draft: String },
    Committing { pending: String },
}

/// What a commit did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TitleCommit {
    ReadOnly,
    /// Sanitized text equals the persisted title, nothing sent
    Unchanged,
    /// Empty title, nothing sent, the untitled label is shown
    Placeholder,
    /// Empty title, nothing sent, the persisted title is shown again
    Reverted,
    Committed(Document),
}

struct Inner {
    state: TitleState,
    document: Document,
    /// Input typed while a commit was in flight
    next_draft: Option<String>,
}

pub struct TitleController {
    inner: Mutex<Inner>,
    commit_queue: tokio::sync::Mutex<()>,
    document_tx: watch::Sender<Document>,
    pipeline: MutationPipeline,
    notices: Arc<NoticeCenter>,
    policy: EmptyTitlePolicy,
    untitled_label: String,
    origin: ViewId,
}

impl TitleController {
    pub fn new(
        document: Document,
        pipeline: MutationPipeline,
        notices: Arc<NoticeCenter>,
        config: &SyncConfig,
        origin: ViewId,
    ) -> Self {
        let state = initial_state(&document);
        let (document_tx, _) = watch::channel(document.clone());

        Self {
            inner: Mutex::new(Inner {
                state,
                document,
                next_draft: None,
            }),
            commit_queue: tokio::sync::Mutex::new(()),
            document_tx,
            pipeline,
            notices,
            policy: config.empty_title_policy,
            untitled_label: config.untitled_label.clone(),
            origin,
        }
    }

    pub fn state(&self) -> TitleState {
        self.lock().state.clone()
    }

    pub fn persisted_title(&self) -> String {
        self.lock().document.title.clone()
    }

    /// Last known server version of the document
    pub fn document(&self) -> Document {
        self.lock().document.clone()
    }

    /// Follow the last known server version, abilities included
    pub fn subscribe_document(&self) -> watch::Receiver<Document> {
        self.document_tx.subscribe()
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self.lock().state, TitleState::ReadOnly { .. })
    }

    /// Text currently shown in the title field
    pub fn display(&self) -> String {
        let inner = self.lock();
        match &inner.state {
            TitleState::ReadOnly { title } => title.clone(),
            TitleState::Idle { display } => display.clone(),
            TitleState::Editing { draft } => draft.clone(),
            TitleState::Committing { pending } => {
                inner.next_draft.clone().unwrap_or_else(|| pending.clone())
            }
        }
    }

    /// Displayed text, or the untitled label when it is empty
    pub fn display_label(&self) -> String {
        let display = self.display();
        if display.is_empty() {
            self.untitled_label.clone()
        } else {
            display
        }
    }

    /// A keystroke. Returns false when the title is read-only.
    pub fn input(&self, text: &str) -> bool {
        let mut inner = self.lock();
        match inner.state {
            TitleState::ReadOnly { .. } => false,
            TitleState::Committing { .. } => {
                inner.next_draft = Some(text.to_string());
                true
            }
            TitleState::Idle { .. } | TitleState::Editing { .. } => {
                inner.state = TitleState::Editing {
                    draft: text.to_string(),
                };
                true
            }
        }
    }

    /// End of edit: persist `text` if it changes the title
    ///
    /// On failure the entered text stays displayed, an error notice lists
    /// the causes and the error is returned to the caller.
    pub async fn commit(&self, text: &str) -> SyncResult<TitleCommit> {
        let _queued = self.commit_queue.lock().await;
        let sanitized = sanitize_title(text);

        let access = {
            let mut inner = self.lock();
            if matches!(inner.state, TitleState::ReadOnly { .. }) {
                return Ok(TitleCommit::ReadOnly);
            }

            let persisted = inner.document.title.clone();
            if sanitized.is_empty() {
                match self.policy {
                    EmptyTitlePolicy::Placeholder => {
                        inner.state = TitleState::Idle {
                            display: String::new(),
                        };
                        return Ok(TitleCommit::Placeholder);
                    }
                    EmptyTitlePolicy::RevertToPersisted => {
                        inner.state = TitleState::Idle { display: persisted };
                        return Ok(TitleCommit::Reverted);
                    }
                    EmptyTitlePolicy::PersistEmpty => {}
                }
            }

            if sanitized == persisted {
                debug!("Title unchanged, nothing to persist");
                inner.state = TitleState::Idle { display: sanitized };
                return Ok(TitleCommit::Unchanged);
            }

            let Some(access) = WriteAccess::for_document(&inner.document) else {
                inner.state = TitleState::ReadOnly { title: persisted };
                return Ok(TitleCommit::ReadOnly);
            };

            inner.state = TitleState::Committing {
                pending: sanitized.clone(),
            };
            access
        };

        let document_id = access.document_id().to_string();
        let mutation = Mutation::new(&document_id, DocumentPatch::title(&sanitized)).then(
            Effect::Broadcast {
                key: QueryKey::doc(&document_id).broadcast_key(),
                origin: Some(self.origin),
            },
        );

        let result = self
            .pipeline
            .update_document_with(&access, mutation, |_| {
                self.notices.success("Document title updated successfully")
            })
            .await;

        let mut inner = self.lock();
        let next_draft = inner.next_draft.take();
        match result {
            Ok(document) => {
                info!("Renamed document '{}' to '{}'", document.id, document.title);
                inner.state = match next_draft {
                    Some(draft) => TitleState::Editing { draft },
                    None => TitleState::Idle {
                        display: document.title.clone(),
                    },
                };
                inner.document = document.clone();
                self.document_tx.send_replace(document.clone());
                Ok(TitleCommit::Committed(document))
            }
            Err(e) => {
                inner.state = TitleState::Editing {
                    draft: next_draft.unwrap_or(sanitized),
                };
                drop(inner);
                self.notices
                    .error("The document title could not be updated", e.causes());
                Err(e)
            }
        }
    }

    /// A new version of the document arrived from elsewhere
    ///
    /// The display follows it unless a local edit is pending.
    pub fn on_document(&self, document: &Document) {
        let mut inner = self.lock();
        inner.document = document.clone();
        self.document_tx.send_replace(document.clone());

        if !document.abilities.partial_update {
            inner.state = TitleState::ReadOnly {
                title: document.title.clone(),
            };
            return;
        }

        match inner.state {
            TitleState::ReadOnly { .. } | TitleState::Idle { .. } => {
                inner.state = TitleState::Idle {
                    display: document.title.clone(),
                };
            }
            TitleState::Editing { .. } | TitleState::Committing { .. } => {
                debug!("Keeping local title edit over incoming document");
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn initial_state(document: &Document) -> TitleState {
    if document.abilities.partial_update {
        TitleState::Idle {
            display: document.title.clone(),
        }
    } else {
        TitleState::ReadOnly {
            title: document.title.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::UpdateDocs;
    use crate::document::Abilities;
    use crate::error::ApiError;
    use crate::notice::NoticeLevel;
    use crate::testing::Fixture;
    use rstest::rstest;
    use std::time::Duration;

    fn controller(fx: &Fixture, id: &str) -> TitleController {
        controller_with(fx, id, &fx.config)
    }

    fn controller_with(fx: &Fixture, id: &str, config: &SyncConfig) -> TitleController {
        TitleController::new(
            fx.api.document(id).unwrap(),
            fx.pipeline.clone(),
            fx.notices.clone(),
            config,
            ViewId::new(),
        )
    }

    #[rstest]
    #[case("Final Report", "Final Report")]
    #[case("  \nHello\r\n ", "Hello")]
    #[case("Hello\nWorld", "HelloWorld")]
    #[case("a\r\nb\rc", "abc")]
    #[case(" \t\n ", "")]
    #[case("", "")]
    fn test_sanitize_title(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(sanitize_title(input), expected);
    }

    #[tokio::test]
    async fn test_rename_commits_and_propagates() {
        let fx = Fixture::with_document("42", "Draft", Abilities::owner());
        fx.cache.put_list(vec![fx.api.document("42").unwrap()]);
        let mut notices = fx.notices.subscribe();
        let mut sub = fx.hub.subscribe("doc-42");
        let title = controller(&fx, "42");

        assert!(title.input("Final Report"));
        assert_eq!(
            title.state(),
            TitleState::Editing {
                draft: "Final Report".to_string()
            }
        );
        assert_eq!(fx.api.update_calls(), 0);

        let outcome = title.commit("Final Report").await.unwrap();

        assert!(matches!(outcome, TitleCommit::Committed(ref doc) if doc.title == "Final Report"));
        assert_eq!(fx.api.document("42").unwrap().title, "Final Report");
        assert!(fx.cache.is_stale(&QueryKey::DocList));
        assert_eq!(
            fx.bridge.update_calls(),
            vec![UpdateDocs {
                docs_id: "42".to_string(),
                content: None,
                name: Some("Final Report".to_string()),
            }]
        );
        assert_eq!(
            title.state(),
            TitleState::Idle {
                display: "Final Report".to_string()
            }
        );
        assert_eq!(title.persisted_title(), "Final Report");

        assert!(sub.try_recv().is_some());
        assert!(sub.try_recv().is_none());
        assert_eq!(notices.recv().await.unwrap().level, NoticeLevel::Success);
    }

    #[tokio::test]
    async fn test_commit_sends_sanitized_title() {
        let fx = Fixture::with_document("42", "Draft", Abilities::owner());
        let title = controller(&fx, "42");

        title.commit("  \nHello\r\n ").await.unwrap();

        assert_eq!(
            fx.api.patches(),
            vec![("42".to_string(), DocumentPatch::title("Hello"))]
        );
        assert_eq!(title.display(), "Hello");
    }

    #[tokio::test]
    async fn test_same_title_issues_no_request() {
        let fx = Fixture::with_document("42", "Draft", Abilities::owner());
        let title = controller(&fx, "42");

        assert_eq!(title.commit(" Draft\n").await.unwrap(), TitleCommit::Unchanged);
        assert_eq!(fx.api.update_calls(), 0);
        assert!(fx.bridge.calls().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_commit_is_idempotent() {
        let fx = Fixture::with_document("42", "Draft", Abilities::owner());
        let title = controller(&fx, "42");

        title.commit("Final").await.unwrap();
        assert_eq!(title.commit("Final").await.unwrap(), TitleCommit::Unchanged);

        assert_eq!(fx.api.update_calls(), 1);
        assert_eq!(fx.bridge.update_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_identical_commits_are_queued() {
        let fx = Fixture::with_document("42", "Draft", Abilities::owner());
        fx.api.set_update_delay(Some(Duration::from_millis(20)));
        let title = controller(&fx, "42");

        let (first, second) = tokio::join!(title.commit("Final"), title.commit("Final"));

        assert!(matches!(first.unwrap(), TitleCommit::Committed(_)));
        assert_eq!(second.unwrap(), TitleCommit::Unchanged);
        assert_eq!(fx.api.update_calls(), 1);
    }

    #[tokio::test]
    async fn test_whitespace_title_shows_placeholder() {
        let fx = Fixture::with_document("42", "Draft", Abilities::owner());
        let title = controller(&fx, "42");

        assert_eq!(title.commit("  \n ").await.unwrap(), TitleCommit::Placeholder);

        assert_eq!(fx.api.update_calls(), 0);
        assert_eq!(title.display_label(), "Untitled document");
        assert_eq!(title.persisted_title(), "Draft");
    }

    #[tokio::test]
    async fn test_whitespace_title_reverts_when_configured() {
        let fx = Fixture::with_document("42", "Draft", Abilities::owner());
        let config = SyncConfig {
            empty_title_policy: EmptyTitlePolicy::RevertToPersisted,
            ..fx.config.clone()
        };
        let title = controller_with(&fx, "42", &config);

        assert_eq!(title.commit("\r\n").await.unwrap(), TitleCommit::Reverted);
        assert_eq!(fx.api.update_calls(), 0);
        assert_eq!(title.display(), "Draft");
    }

    #[tokio::test]
    async fn test_whitespace_title_persists_empty_when_configured() {
        let fx = Fixture::with_document("42", "Draft", Abilities::owner());
        let config = SyncConfig {
            empty_title_policy: EmptyTitlePolicy::PersistEmpty,
            ..fx.config.clone()
        };
        let title = controller_with(&fx, "42", &config);

        let outcome = title.commit("   ").await.unwrap();

        assert!(matches!(outcome, TitleCommit::Committed(ref doc) if doc.title.is_empty()));
        assert_eq!(
            fx.api.patches(),
            vec![("42".to_string(), DocumentPatch::title(""))]
        );
        assert_eq!(title.display_label(), "Untitled document");

        // already empty server-side: nothing more to send
        assert_eq!(title.commit("").await.unwrap(), TitleCommit::Unchanged);
        assert_eq!(fx.api.update_calls(), 1);
    }

    #[tokio::test]
    async fn test_failure_keeps_entered_text() {
        let fx = Fixture::with_document("42", "Draft", Abilities::owner());
        fx.api.fail_next(ApiError::new(
            "Failed to update the doc",
            Some(500),
            vec!["Internal server error".to_string()],
        ));
        let mut notices = fx.notices.subscribe();
        let title = controller(&fx, "42");

        let err = title.commit("Final").await.unwrap_err();

        assert_eq!(err.causes(), vec!["Internal server error".to_string()]);
        assert_eq!(
            title.state(),
            TitleState::Editing {
                draft: "Final".to_string()
            }
        );
        assert_eq!(title.persisted_title(), "Draft");
        assert!(fx.bridge.calls().is_empty());

        let notice = notices.recv().await.unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert!(notice.dismissible);
        assert_eq!(notice.causes, vec!["Internal server error".to_string()]);

        // user retries by committing again
        assert!(matches!(
            title.commit("Final").await.unwrap(),
            TitleCommit::Committed(_)
        ));
    }

    #[tokio::test]
    async fn test_read_only_never_leaves_display_state() {
        let fx = Fixture::with_document("42", "Shared with me", Abilities::reader());
        let title = controller(&fx, "42");

        assert!(!title.input("Hijacked"));
        assert_eq!(title.commit("Hijacked").await.unwrap(), TitleCommit::ReadOnly);

        let mut renamed = fx.api.document("42").unwrap();
        renamed.title = "Renamed by owner".to_string();
        title.on_document(&renamed);

        assert_eq!(
            title.state(),
            TitleState::ReadOnly {
                title: "Renamed by owner".to_string()
            }
        );
        assert_eq!(fx.api.update_calls(), 0);
    }

    #[tokio::test]
    async fn test_external_update_resyncs_idle_display_only() {
        let fx = Fixture::with_document("42", "Draft", Abilities::owner());
        let title = controller(&fx, "42");
        let mut incoming = fx.api.document("42").unwrap();

        incoming.title = "From elsewhere".to_string();
        title.on_document(&incoming);
        assert_eq!(title.display(), "From elsewhere");

        title.input("My draft");
        incoming.title = "Another rename".to_string();
        title.on_document(&incoming);
        assert_eq!(title.display(), "My draft");
        assert_eq!(title.persisted_title(), "Another rename");
    }

    #[tokio::test]
    async fn test_document_watch_follows_abilities() {
        let fx = Fixture::with_document("42", "Draft", Abilities::owner());
        let title = controller(&fx, "42");
        let rx = title.subscribe_document();
        assert!(rx.borrow().abilities.partial_update);

        let mut revoked = fx.api.document("42").unwrap();
        revoked.abilities = Abilities::reader();
        title.on_document(&revoked);

        assert!(!rx.borrow().abilities.partial_update);
        assert!(title.is_read_only());
    }

    #[tokio::test]
    async fn test_granted_write_access_unlocks_title() {
        let fx = Fixture::with_document("42", "Draft", Abilities::reader());
        let title = controller(&fx, "42");
        assert!(title.is_read_only());

        let mut upgraded = fx.api.document("42").unwrap();
        upgraded.abilities = Abilities::owner();
        title.on_document(&upgraded);

        assert!(!title.is_read_only());
        assert!(title.input("Mine now"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_input_during_commit_is_not_lost() {
        let fx = Fixture::with_document("42", "Draft", Abilities::owner());
        fx.api.set_update_delay(Some(Duration::from_millis(20)));
        let title = controller(&fx, "42");

        let (committed, _) = tokio::join!(title.commit("Final"), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            assert_eq!(
                title.state(),
                TitleState::Committing {
                    pending: "Final".to_string()
                }
            );
            title.input("Final v2");
            assert_eq!(title.display(), "Final v2");
        });

        assert!(committed.is_ok());
        assert_eq!(
            title.state(),
            TitleState::Editing {
                draft: "Final v2".to_string()
            }
        );
        assert_eq!(title.persisted_title(), "Final");
    }
}
