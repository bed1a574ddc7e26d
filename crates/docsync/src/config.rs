use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{SyncError, SyncResult};

/// What an empty (after sanitizing) title commit does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyTitlePolicy {
    /// No mutation; the view shows the untitled label
    #[default]
    Placeholder,
    /// No mutation; the view shows the persisted title again
    RevertToPersisted,
    /// Persist the empty string when it differs from the stored title
    PersistEmpty,
}

/// Runtime configuration for a docsync client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub api_base_url: String,
    /// Host folder receiving documents created without an explicit target
    pub default_dir_id: String,
    pub empty_title_policy: EmptyTitlePolicy,
    pub untitled_label: String,
    /// Character opening the mention menu, stripped before searching
    pub mention_trigger: char,
    pub autosave_interval_ms: u64,
    pub broadcast_capacity: usize,
    pub request_timeout_ms: u64,
    /// How long a mention search waits for the host to answer
    pub search_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8071/api/v1.0/".to_string(),
            default_dir_id: "io.cozy.files.root-dir".to_string(),
            empty_title_policy: EmptyTitlePolicy::default(),
            untitled_label: "Untitled document".to_string(),
            mention_trigger: '+',
            autosave_interval_ms: 1000,
            broadcast_capacity: 256,
            request_timeout_ms: 30_000,
            search_timeout_ms: 10_000,
        }
    }
}

impl SyncConfig {
    /// Parse a JSON document; missing fields keep their defaults
    pub fn from_json_str(json: &str) -> SyncResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SyncError::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file and apply environment overrides
    pub async fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SyncError::Config(format!("failed to read {}: {e}", path.display())))?;
        let mut config = Self::from_json_str(&contents)?;
        config.apply_env_overrides();
        config.validate()?;
        debug!("Loaded docsync config from {}", path.display());
        Ok(config)
    }

    /// `DOCSYNC_API_BASE_URL` and `DOCSYNC_DEFAULT_DIR_ID` win over file values
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("DOCSYNC_API_BASE_URL") {
            if !url.is_empty() {
                self.api_base_url = url;
            }
        }
        if let Ok(dir_id) = std::env::var("DOCSYNC_DEFAULT_DIR_ID") {
            if !dir_id.is_empty() {
                self.default_dir_id = dir_id;
            }
        }
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_millis(self.autosave_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }

    fn validate(&self) -> SyncResult<()> {
        if self.autosave_interval_ms == 0 {
            return Err(SyncError::Config(
                "autosave_interval_ms must be > 0".to_string(),
            ));
        }
        if self.search_timeout_ms == 0 {
            return Err(SyncError::Config(
                "search_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.broadcast_capacity == 0 {
            return Err(SyncError::Config(
                "broadcast_capacity must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
