use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{error_causes, DocumentApi};
use crate::config::SyncConfig;
use crate::document::{Document, DocumentPatch};
use crate::error::ApiError;
use crate::{SyncError, SyncResult};

/// `DocumentApi` over HTTP with reqwest
pub struct HttpDocumentApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpDocumentApi {
    pub fn new(config: &SyncConfig) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SyncError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self::with_client(&config.api_base_url, client))
    }

    /// Use a preconfigured client (cookies, auth headers)
    pub fn with_client(base_url: &str, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&DocumentPatch>,
        failure: &str,
    ) -> SyncResult<T> {
        let url = self.url(path);
        debug!("{} {}", method, url);

        let mut request = self.client.request(method.clone(), &url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SyncError::Transport(format!("{} {}: {}", method, url, e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SyncError::Transport(format!("failed to read body from {}: {}", url, e)))?;

        if !status.is_success() {
            warn!("{} {} answered HTTP {}", method, url, status.as_u16());
            return Err(api_error(failure, status, &text));
        }

        Ok(serde_json::from_str(&text)?)
    }
}

fn api_error(message: &str, status: StatusCode, body: &str) -> SyncError {
    ApiError::new(message, Some(status.as_u16()), error_causes(body)).into()
}

#[async_trait]
impl DocumentApi for HttpDocumentApi {
    async fn create_document(&self) -> SyncResult<Document> {
        self.send(Method::POST, "documents/", None, "Failed to create the doc")
            .await
    }

    async fn get_document(&self, id: &str) -> SyncResult<Document> {
        let path = format!("documents/{}/", id);
        match self.send(Method::GET, &path, None, "Failed to get the doc").await {
            Err(SyncError::Api(ApiError {
                status: Some(404), ..
            })) => Err(SyncError::DocumentNotFound { id: id.to_string() }),
            other => other,
        }
    }

    async fn update_document(&self, id: &str, patch: &DocumentPatch) -> SyncResult<Document> {
        let path = format!("documents/{}/", id);
        self.send(Method::PATCH, &path, Some(patch), "Failed to update the doc")
            .await
    }
}
