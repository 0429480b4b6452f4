//! Transport service trait
//!
//! Abstraction over the scan worker's HTTP API. The job client only talks to
//! the worker through [`ScanTransport`]; [`ApiClient`](crate::infra::api_client::ApiClient)
//! is the production implementation and tests plug in
//! [`StubTransport`](crate::infra::testing::stubs::StubTransport).

use async_trait::async_trait;
use cloudscan_model::{
    AsyncScanAccepted, DiscoveryResponse, JobId, JobSummary, StatusResponse,
    SyncScanResponse,
};
use std::fmt::Debug;
use thiserror::Error;
use zeroize::Zeroizing;

/// Errors raised while talking to the scan worker
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection, timeout or body read failure
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The worker answered with a non-success status
    #[error("worker returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The worker answered but the body did not match the expected shape
    #[error("malformed response: {0}")]
    Decode(String),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Service-account key upload for project discovery
pub struct KeyUpload {
    pub file_name: String,
    pub contents: Zeroizing<Vec<u8>>,
}

impl Debug for KeyUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyUpload")
            .field("file_name", &self.file_name)
            .field("contents", &format_args!("<{} bytes>", self.contents.len()))
            .finish()
    }
}

/// Parameters for starting an asynchronous GCP scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcpScanRequest {
    pub key_id: String,
    pub project_id: String,
    pub checks: Option<String>,
}

/// Parameters for the synchronous AWS scan
pub struct AwsScanRequest {
    pub access_key: String,
    pub secret_key: Zeroizing<String>,
    pub region: String,
    pub checks: Option<String>,
}

impl Debug for AwsScanRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsScanRequest")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("region", &self.region)
            .field("checks", &self.checks)
            .finish()
    }
}

/// Transport capability consumed by the job client
#[async_trait]
pub trait ScanTransport: Send + Sync + Debug {
    /// Upload a key file and enumerate the projects it can reach
    async fn discover(
        &self,
        upload: &KeyUpload,
    ) -> TransportResult<DiscoveryResponse>;

    /// Create an asynchronous scan job
    async fn submit_async(
        &self,
        request: &GcpScanRequest,
    ) -> TransportResult<AsyncScanAccepted>;

    /// Run a scan that answers with its result directly
    async fn submit_sync(
        &self,
        request: &AwsScanRequest,
    ) -> TransportResult<SyncScanResponse>;

    /// Fetch the current status of a job
    async fn fetch_status(&self, job_id: &JobId)
    -> TransportResult<StatusResponse>;

    /// List past jobs known to the worker
    async fn fetch_history(&self) -> TransportResult<Vec<JobSummary>>;
}
