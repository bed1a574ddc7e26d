use crate::collab::ProviderStatus;
use crate::document::{Abilities, Document};

/// Everything the editability decision depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionInputs {
    pub partial_update: bool,
    pub session_ready: bool,
    pub session_loading: bool,
}

impl PermissionInputs {
    pub fn new(abilities: &Abilities, status: ProviderStatus) -> Self {
        Self {
            partial_update: abilities.partial_update,
            session_ready: status.synced,
            session_loading: status.loading,
        }
    }
}

/// Whether the content editor accepts local edits.
///
/// Server-side write permission is not enough: while the provider is still
/// negotiating, edits would apply to a content tree that is not yet in sync.
pub fn resolve_editable(inputs: &PermissionInputs) -> bool {
    inputs.partial_update && inputs.session_ready && !inputs.session_loading
}

/// Proof that the current user may patch a document's metadata
///
/// Only minted from abilities granting `partial_update`, and required by
/// the mutation pipeline, so a read-only document cannot reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteAccess {
    document_id: String,
}

impl WriteAccess {
    pub fn for_document(document: &Document) -> Option<Self> {
        document.abilities.partial_update.then(|| Self {
            document_id: document.id.clone(),
        })
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(true, true, false, true)]
    #[case(true, true, true, false)]
    #[case(true, false, false, false)]
    #[case(true, false, true, false)]
    #[case(false, true, false, false)]
    #[case(false, true, true, false)]
    #[case(false, false, false, false)]
    #[case(false, false, true, false)]
    fn test_editable_truth_table(
        #[case] partial_update: bool,
        #[case] session_ready: bool,
        #[case] session_loading: bool,
        #[case] expected: bool,
    ) {
        let inputs = PermissionInputs {
            partial_update,
            session_ready,
            session_loading,
        };
        assert_eq!(resolve_editable(&inputs), expected);
    }

    #[test]
    fn test_loading_session_is_never_editable() {
        let inputs = PermissionInputs::new(&Abilities::owner(), ProviderStatus::connecting());
        assert!(!resolve_editable(&inputs));

        let inputs = PermissionInputs::new(&Abilities::owner(), ProviderStatus::ready());
        assert!(resolve_editable(&inputs));
    }

    #[test]
    fn test_write_access_requires_partial_update() {
        let writable = Document::new("a", "Draft", Abilities::owner());
        let readonly = Document::new("b", "Draft", Abilities::reader());

        assert_eq!(
            WriteAccess::for_document(&writable).unwrap().document_id(),
            "a"
        );
        assert!(WriteAccess::for_document(&readonly).is_none());
    }
}
