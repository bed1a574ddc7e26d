//! REST transport seam.
//!
//! The coordination core only talks to [`DocumentApi`]; the HTTP
//! implementation lives behind the `http` feature.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::document::{Document, DocumentPatch};
use crate::SyncResult;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::HttpDocumentApi;

/// Document metadata endpoints
#[async_trait]
pub trait DocumentApi: Send + Sync {
    /// `POST documents/`
    async fn create_document(&self) -> SyncResult<Document>;

    /// `GET documents/{id}/`
    async fn get_document(&self, id: &str) -> SyncResult<Document>;

    /// `PATCH documents/{id}/` with only the changed fields
    async fn update_document(&self, id: &str, patch: &DocumentPatch) -> SyncResult<Document>;
}

/// Extract human readable causes from an error response body
///
/// JSON objects contribute every string found under their values, arrays
/// every string they contain. Anything else falls back to the raw text.
pub fn error_causes(body: &str) -> Vec<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    match serde_json::from_str::<JsonValue>(trimmed) {
        Ok(value) => {
            let mut causes = Vec::new();
            collect_causes(&value, &mut causes);
            causes
        }
        Err(_) => vec![trimmed.to_string()],
    }
}

fn collect_causes(value: &JsonValue, out: &mut Vec<String>) {
    match value {
        JsonValue::Null => {}
        JsonValue::String(s) => out.push(s.clone()),
        JsonValue::Bool(_) | JsonValue::Number(_) => out.push(value.to_string()),
        JsonValue::Array(items) => items.iter().for_each(|item| collect_causes(item, out)),
        JsonValue::Object(map) => map.values().for_each(|item| collect_causes(item, out)),
    }
}
