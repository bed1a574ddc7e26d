use chrono::{DateTime, Utc};
use lib0::decoding::{Cursor, Read};
use lib0::encoding::Write;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::broadcast::ViewId;
use crate::{SyncError, SyncResult};

/// Frames exchanged with other processes showing the same documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WireMessage {
    /// "resource `key` changed, reload your view"
    Broadcast {
        key: String,
        timestamp: DateTime<Utc>,
        origin: Option<ViewId>,
    },
}

/// Frame a message as a lib0 length-prefixed JSON string
pub fn encode_message<T: Serialize>(message: &T) -> SyncResult<Vec<u8>> {
    let payload = serde_json::to_string(message)?;
    let mut frame = Vec::with_capacity(payload.len() + 4);
    frame.write_string(&payload);
    Ok(frame)
}

/// Read one lib0 frame back into a message
pub fn decode_message<T: DeserializeOwned>(frame: &[u8]) -> SyncResult<T> {
    let mut cursor = Cursor::new(frame);
    let payload = cursor.read_string().map_err(|e| SyncError::Protocol {
        message: format!("malformed lib0 frame: {}", e),
    })?;

    Ok(serde_json::from_str(payload)?)
}
