use serde::{Deserialize, Serialize};

use super::SearchHit;

/// Broad category of a mentioned file, derived from its mime type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Pdf,
    Sheet,
    Slide,
    Code,
    Image,
    Audio,
    Note,
    Text,
    File,
}

impl FileKind {
    pub fn from_mime(mime: &str) -> Self {
        let Some((kind, subtype)) = mime.split_once('/') else {
            return FileKind::File;
        };

        match kind {
            "application" if subtype == "pdf" => FileKind::Pdf,
            "application" if subtype.contains("spreadsheet") => FileKind::Sheet,
            "application" if subtype.contains("presentation") => FileKind::Slide,
            "application" if subtype.contains("xml") || subtype.contains("json") => {
                FileKind::Code
            }
            "image" => FileKind::Image,
            "audio" => FileKind::Audio,
            "text" if subtype == "vnd.cozy.note+markdown" => FileKind::Note,
            "text" => FileKind::Text,
            "sheet" => FileKind::Sheet,
            "slide" => FileKind::Slide,
            _ => FileKind::File,
        }
    }
}

/// Inline content inserted into the editor when a suggestion is picked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMention {
    pub filename: String,
    pub url: String,
    pub mimetype: String,
}

impl FileMention {
    pub fn kind(&self) -> FileKind {
        FileKind::from_mime(&self.mimetype)
    }
}

/// One entry of the mention menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionSuggestion {
    pub title: String,
    pub mention: FileMention,
}

impl From<SearchHit> for MentionSuggestion {
    fn from(hit: SearchHit) -> Self {
        let title = hit.title.unwrap_or_default();
        let mimetype = hit.doc.and_then(|doc| doc.mime).unwrap_or_default();

        Self {
            mention: FileMention {
                filename: title.clone(),
                url: hit.url.unwrap_or_default(),
                mimetype,
            },
            title,
        }
    }
}
