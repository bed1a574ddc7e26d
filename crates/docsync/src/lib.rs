//! # docsync - collaborative document coordination
//!
//! Client-side coordination core for a collaborative rich-text editor.
//!
//! docsync keeps document metadata consistent between the REST backend, the
//! embedding host application and every open view of the same document:
//! title editing, permission-gated editability, ordered post-mutation
//! side effects and cross-view invalidation signals.

pub mod api;
pub mod autosave;
pub mod bridge;
pub mod broadcast;
pub mod collab;
pub mod config;
pub mod document;
pub mod error;
pub mod logging;
pub mod memory;
pub mod notice;
pub mod permission;
pub mod pipeline;
pub mod protocol;
pub mod session;
pub mod title;
pub mod view;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use api::DocumentApi;
pub use autosave::ContentSaver;
pub use bridge::{BridgeSynchronizer, HostBridge, SearchOutcome, SearchSession};
pub use broadcast::{BroadcastEvent, BroadcastHub, BroadcastSubscription, ViewId};
pub use collab::{CollaborativeSession, ProviderStatus, SharedDocument};
pub use config::{EmptyTitlePolicy, SyncConfig};
pub use document::{Abilities, Document, DocumentPatch, QueryCache, QueryKey};
pub use error::{ApiError, SyncError, SyncResult};
pub use notice::{Notice, NoticeCenter, NoticeLevel};
pub use permission::{resolve_editable, PermissionInputs, WriteAccess};
pub use pipeline::{Effect, Mutation, MutationPipeline};
pub use session::{Editor, EditorLease, Heading, SessionStore};
pub use title::{sanitize_title, TitleCommit, TitleController, TitleState};
pub use view::DocumentView;

#[cfg(feature = "http")]
pub use api::HttpDocumentApi;
