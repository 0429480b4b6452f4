use async_trait::async_trait;
use cloudscan_model::{
    AsyncScanAccepted, DiscoveryResponse, ErrorBody, HistoryResponse, JobId,
    JobSummary, StatusResponse, SyncScanResponse,
};
use reqwest::{Client, RequestBuilder, multipart};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::infra::services::transport::{
    AwsScanRequest, GcpScanRequest, KeyUpload, ScanTransport, TransportError,
    TransportResult,
};

/// HTTP client for the scan worker
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Normalize a user-provided base URL.
///
/// Users often type "localhost:8000", which reqwest rejects; add `http://`
/// when the scheme is missing and trim a trailing slash to prevent double
/// slashes when joining paths.
pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

impl ApiClient {
    /// Create a new API client with a per-request timeout
    pub fn new(base_url: &str, timeout: Duration) -> TransportResult<Self> {
        let normalized = normalize_base_url(base_url);
        if normalized != base_url {
            warn!(
                "[ApiClient] Normalized base URL from '{}' to '{}'",
                base_url, normalized
            );
        }

        let client = Client::builder().timeout(timeout).build()?;

        info!(
            "[ApiClient] Creating new API client with base URL: {}",
            normalized
        );

        Ok(Self {
            client,
            base_url: normalized,
        })
    }

    /// Build a full URL from a worker-relative path
    pub fn build_url(&self, path: impl AsRef<str>) -> String {
        let p = path.as_ref();
        if p.starts_with("http://") || p.starts_with("https://") {
            return p.to_string();
        }
        format!("{}/{}", self.base_url, p.trim_start_matches('/'))
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Execute a request and decode a JSON body, mapping worker errors
    async fn execute_request<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> TransportResult<T> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            let body = response.bytes().await?;
            return serde_json::from_slice(&body)
                .map_err(|err| TransportError::Decode(err.to_string()));
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        // The worker wraps failures as {"error": "..."}; fall back to raw text.
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|parsed| parsed.error)
            .unwrap_or(body);
        Err(TransportError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl ScanTransport for ApiClient {
    async fn discover(
        &self,
        upload: &KeyUpload,
    ) -> TransportResult<DiscoveryResponse> {
        let part = multipart::Part::bytes(upload.contents.to_vec())
            .file_name(upload.file_name.clone())
            .mime_str("application/json")?;
        let form = multipart::Form::new().part("keyFile", part);

        debug!("[ApiClient] Uploading key file {}", upload.file_name);
        let request = self
            .client
            .post(self.build_url("gcp/projects"))
            .multipart(form);
        self.execute_request(request).await
    }

    async fn submit_async(
        &self,
        request: &GcpScanRequest,
    ) -> TransportResult<AsyncScanAccepted> {
        let mut form = vec![
            ("keyId", request.key_id.as_str()),
            ("projectId", request.project_id.as_str()),
        ];
        if let Some(checks) = request.checks.as_deref() {
            form.push(("checks", checks));
        }

        let request = self
            .client
            .post(self.build_url("scan/async/gcp/"))
            .form(&form);
        self.execute_request(request).await
    }

    async fn submit_sync(
        &self,
        request: &AwsScanRequest,
    ) -> TransportResult<SyncScanResponse> {
        let mut form = vec![
            ("accessKey", request.access_key.as_str()),
            ("secretKey", request.secret_key.as_str()),
            ("region", request.region.as_str()),
        ];
        if let Some(checks) = request.checks.as_deref() {
            form.push(("checks", checks));
        }

        let request =
            self.client.post(self.build_url("scan/aws")).form(&form);
        self.execute_request(request).await
    }

    async fn fetch_status(
        &self,
        job_id: &JobId,
    ) -> TransportResult<StatusResponse> {
        let url = self.build_url(format!("scan/status/{}/", job_id));
        self.execute_request(self.client.get(url)).await
    }

    async fn fetch_history(&self) -> TransportResult<Vec<JobSummary>> {
        let history: HistoryResponse = self
            .execute_request(self.client.get(self.build_url("scan/history/")))
            .await?;
        Ok(history.data)
    }
}
