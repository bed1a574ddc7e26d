use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Operations the server allows the current user on a document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Abilities {
    pub destroy: bool,
    pub partial_update: bool,
    pub retrieve: bool,
    pub update: bool,
    pub versions_list: bool,
    pub versions_retrieve: bool,
}

impl Abilities {
    /// Abilities of an owner: everything allowed
    pub fn owner() -> Self {
        Self {
            destroy: true,
            partial_update: true,
            retrieve: true,
            update: true,
            versions_list: true,
            versions_retrieve: true,
        }
    }

    /// Abilities of a reader
    pub fn reader() -> Self {
        Self {
            retrieve: true,
            ..Self::default()
        }
    }
}

/// Document metadata as returned by the REST API
///
/// `content` is the opaque encoded CRDT state; this crate never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
    #[serde(default)]
    pub abilities: Abilities,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// The server sends `null` for a document that was never titled or saved
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Document {
    pub fn new(id: impl Into<String>, title: impl Into<String>, abilities: Abilities) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: String::new(),
            abilities,
            created_at: None,
            updated_at: None,
        }
    }

    /// Copy of this document with the patch applied locally
    pub fn patched(&self, patch: &DocumentPatch) -> Self {
        let mut next = self.clone();
        if let Some(title) = &patch.title {
            next.title = title.clone();
        }
        if let Some(content) = &patch.content {
            next.content = content.clone();
        }
        next
    }
}

/// Sparse set of fields sent with a PATCH
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl DocumentPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            content: None,
        }
    }

    pub fn content(content: impl Into<String>) -> Self {
        Self {
            title: None,
            content: Some(content.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_patch_serializes_only_changed_fields() {
        let patch = DocumentPatch::title("Final Report");
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            json!({"title": "Final Report"})
        );
        assert!(DocumentPatch::default().is_empty());
    }

    #[test]
    fn test_document_deserializes_with_missing_fields() {
        let doc: Document = serde_json::from_value(json!({
            "id": "doc-1",
            "title": "Draft",
            "abilities": {"partial_update": true, "unknown_flag": true},
            "created_at": "2024-05-01T10:00:00Z"
        }))
        .unwrap();

        assert_eq!(doc.title, "Draft");
        assert!(doc.abilities.partial_update);
        assert!(!doc.abilities.destroy);
        assert!(doc.created_at.is_some());
        assert!(doc.content.is_empty());
    }

    #[test]
    fn test_document_null_title_and_content_read_as_empty() {
        let doc: Document = serde_json::from_value(json!({
            "id": "doc-1",
            "title": null,
            "content": null,
            "abilities": {"partial_update": true}
        }))
        .unwrap();

        assert_eq!(doc.title, "");
        assert_eq!(doc.content, "");
        assert!(doc.abilities.partial_update);
    }

    #[test]
    fn test_patched_applies_fields() {
        let doc = Document::new("doc-1", "Draft", Abilities::owner());
        let next = doc.patched(&DocumentPatch::title("Final"));
        assert_eq!(next.title, "Final");
        assert_eq!(next.id, "doc-1");
    }
}
