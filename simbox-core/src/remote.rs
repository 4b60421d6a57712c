//! Object store HTTP client
//!
//! All endpoints live under `{api_base_url}/api/{namespace}`. The client does
//! no caching and no retrying; callers decide what a failure means.

use std::time::Duration;

use reqwest::{Client, Response};
use simbox_protocol::{ApiResponse, DomainsResponse, TreeResponse, UploadRequest};
use simbox_utils::{Result, SimboxError};
use tracing::debug;
use url::Url;

use crate::config::RemoteConfig;

/// Thin client for upload/download/tree against the object store
#[derive(Debug, Clone)]
pub struct RemoteStoreClient {
    http: Client,
    base: Url,
    namespace: String,
}

impl RemoteStoreClient {
    /// Build a client from the `[remote]` config section
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        Self::with_base_url(
            &config.api_base_url,
            &config.namespace,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Build a client for an explicit base URL and namespace
    pub fn with_base_url(base_url: &str, namespace: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| SimboxError::config(format!("invalid api base url '{}': {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(SimboxError::config(format!(
                "api base url '{}' cannot carry a path",
                base_url
            )));
        }

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SimboxError::internal(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            http,
            base,
            namespace: namespace.to_string(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// `POST /oss/upload`
    pub async fn upload(&self, key: &str, content: &str, is_binary_encoded: bool) -> Result<()> {
        self.upload_request(&UploadRequest::new(key, content, is_binary_encoded))
            .await
    }

    /// `POST /oss/upload` with a prepared body
    pub async fn upload_request(&self, request: &UploadRequest) -> Result<()> {
        let url = self.endpoint(&["oss", "upload"], None);
        let key = request.key.as_str();
        debug!(
            key = %key,
            bytes = request.content.len(),
            binary = request.is_binary_encoded,
            "Uploading"
        );

        let response = self
            .http
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| SimboxError::remote(format!("upload {}: {}", key, e)))?;
        let response = check_status(response, key).await?;

        let ack: ApiResponse = response
            .json()
            .await
            .map_err(|e| SimboxError::remote(format!("upload {}: bad response: {}", key, e)))?;
        if !ack.success {
            return Err(SimboxError::RemoteRejected(format!("upload {}: {}", key, ack.message)));
        }
        Ok(())
    }

    /// `GET /oss/download/{path}`, returning the raw text body
    pub async fn download(&self, path: &str) -> Result<String> {
        let mut segments = vec!["oss", "download"];
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        let url = self.endpoint(&segments, None);
        debug!(path = %path, "Downloading");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| SimboxError::remote(format!("download {}: {}", path, e)))?;
        let response = check_status(response, path).await?;

        response
            .text()
            .await
            .map_err(|e| SimboxError::remote(format!("download {}: {}", path, e)))
    }

    /// `GET /oss/tree?prefix=...`, returning the flat key list
    pub async fn tree(&self, prefix: &str) -> Result<Vec<String>> {
        let url = self.endpoint(&["oss", "tree"], Some(("prefix", prefix)));
        debug!(prefix = %prefix, "Listing remote tree");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| SimboxError::remote(format!("tree {}: {}", prefix, e)))?;
        let response = check_status(response, prefix).await?;

        let body: TreeResponse = response
            .json()
            .await
            .map_err(|e| SimboxError::remote(format!("tree {}: bad response: {}", prefix, e)))?;
        if !body.success {
            return Err(SimboxError::remote(format!("tree {}: {}", prefix, body.message)));
        }
        Ok(body.tree)
    }

    /// `GET /domains`
    pub async fn fetch_domains(&self) -> Result<DomainsResponse> {
        let url = self.endpoint(&["domains"], None);

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| SimboxError::DomainResolution(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SimboxError::DomainResolution(format!("HTTP {}", status)));
        }

        response
            .json()
            .await
            .map_err(|e| SimboxError::DomainResolution(format!("bad response: {}", e)))
    }

    fn endpoint(&self, segments: &[&str], query: Option<(&str, &str)>) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .push("api")
                .push(&self.namespace)
                .extend(segments);
        }
        if let Some((key, value)) = query {
            url.query_pairs_mut().append_pair(key, value);
        }
        url
    }
}

async fn check_status(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(SimboxError::remote(format!(
        "{}: HTTP {}{}",
        what,
        status,
        if body.is_empty() {
            String::new()
        } else {
            format!(": {}", body)
        }
    )))
}
