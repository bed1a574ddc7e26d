pub mod cache;
pub mod doc;

pub use cache::{CacheEvent, QueryCache, QueryKey};
pub use doc::{Abilities, Document, DocumentPatch};
