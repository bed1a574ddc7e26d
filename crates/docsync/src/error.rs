use thiserror::Error;

/// Result type for docsync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while coordinating a document
#[derive(Error, Debug)]
pub enum SyncError {
    /// The REST API answered with a non-success status
    #[error("API error: {0}")]
    Api(ApiError),

    /// The request never produced a response (connection, timeout, decode)
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Host bridge not injected, cannot {operation}")]
    BridgeUnavailable { operation: &'static str },

    #[error("Host bridge call {operation} failed: {message}")]
    Bridge {
        operation: &'static str,
        message: String,
    },

    #[error("Document is read-only: {document_id}")]
    ReadOnly { document_id: String },

    #[error("Document not found: {id}")]
    DocumentNotFound { id: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Host-integration defects, reported apart from transport failures
    pub fn is_bridge(&self) -> bool {
        matches!(
            self,
            SyncError::BridgeUnavailable { .. } | SyncError::Bridge { .. }
        )
    }

    /// Underlying causes suitable for an error notice
    pub fn causes(&self) -> Vec<String> {
        match self {
            SyncError::Api(api) => api.causes.clone(),
            other => vec![other.to_string()],
        }
    }
}

impl From<ApiError> for SyncError {
    fn from(error: ApiError) -> Self {
        SyncError::Api(error)
    }
}

/// A failed API call with the causes extracted from the response body
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}{}", http_suffix(.status))]
pub struct ApiError {
    pub message: String,
    pub status: Option<u16>,
    pub causes: Vec<String>,
}

impl ApiError {
    pub fn new(message: impl Into<String>, status: Option<u16>, causes: Vec<String>) -> Self {
        Self {
            message: message.into(),
            status,
            causes,
        }
    }

    pub fn causes(&self) -> &[String] {
        &self.causes
    }
}

fn http_suffix(status: &Option<u16>) -> String {
    status
        .map(|status| format!(" (HTTP {status})"))
        .unwrap_or_default()
}
