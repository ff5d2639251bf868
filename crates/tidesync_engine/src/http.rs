//! HTTP cloud handler.
//!
//! This module provides an HTTP-based cloud handler for the sync engine.
//! The actual HTTP client is abstracted via [`HttpClient`]; the `reqwest`
//! feature provides `ReqwestClient`.

use crate::config::{Config, DEFAULT_CLOUD_PATH};
use crate::error::{SyncError, SyncResult};
use crate::transport::{CloudHandler, CloudRequest};
use parking_lot::RwLock;
use serde_json::Value;
use std::future::Future;
use tracing::{debug, warn};

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport. A failed
/// request resolves to `Err` with a human-readable message.
pub trait HttpClient: Send + Sync + 'static {
    /// Sends a POST request and returns the response body.
    fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: Vec<u8>,
    ) -> impl Future<Output = Result<Vec<u8>, String>> + Send;
}

/// Cloud handler that POSTs JSON to `{base_url}{cloud_path}{dataset_id}`.
pub struct HttpCloudHandler<C: HttpClient> {
    base_url: String,
    cloud_path: String,
    headers: Vec<(String, String)>,
    client: C,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpCloudHandler<C> {
    /// Creates a handler for the authority at `base_url`.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cloud_path: DEFAULT_CLOUD_PATH.to_string(),
            headers: vec![("Content-Type".into(), "application/json".into())],
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Creates a handler from `cloud_url` and `cloud_path` in `config`.
    pub fn from_config(config: &Config, client: C) -> SyncResult<Self> {
        let base_url = config
            .cloud_url
            .as_deref()
            .ok_or_else(|| SyncError::InvalidConfig("cloud_url is not set".into()))?;
        Ok(Self::new(base_url, client).with_cloud_path(config.cloud_path()))
    }

    /// Sets the path between the base URL and the dataset id.
    pub fn with_cloud_path(mut self, path: impl Into<String>) -> Self {
        let mut path = path.into();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        if !path.ends_with('/') {
            path.push('/');
        }
        self.cloud_path = path;
        self
    }

    /// Adds a header sent with every request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the URL requests for `dataset_id` are sent to.
    pub fn url_for(&self, dataset_id: &str) -> String {
        format!("{}{}{}", self.base_url, self.cloud_path, dataset_id)
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn set_error(&self, err: &str) {
        *self.last_error.write() = Some(err.to_string());
    }

    fn clear_error(&self) {
        *self.last_error.write() = None;
    }
}

impl<C: HttpClient> CloudHandler for HttpCloudHandler<C> {
    async fn send(&self, request: CloudRequest) -> SyncResult<Value> {
        let url = self.url_for(&request.dataset_id);
        let body = serde_json::to_vec(&request.payload)?;
        debug!(%url, bytes = body.len(), "posting sync request");

        let response = self
            .client
            .post(&url, &self.headers, body)
            .await
            .map_err(|e| {
                warn!(%url, error = %e, "sync request failed");
                self.set_error(&e);
                SyncError::transport_retryable(e)
            })?;
        self.clear_error();

        if response.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&response)
            .map_err(|e| SyncError::Protocol(format!("Failed to decode response: {e}")))
    }
}
