use async_trait::async_trait;
use cloudscan_model::{
    AsyncScanAccepted, DiscoveryResponse, JobId, JobStatus, JobSummary,
    StatusResponse, SyncScanResponse,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::watch;

use crate::infra::services::transport::{
    AwsScanRequest, GcpScanRequest, KeyUpload, ScanTransport, TransportError,
    TransportResult,
};
use crate::infra::storage::{HandleSlot, HandleStoreError, MemoryHandleSlot};

/// Scripted in-memory scan worker
///
/// Status answers are served from a queue; once it drains every poll gets the
/// fallback answer (`running`, 0% unless changed).
#[derive(Debug, Clone)]
pub struct StubTransport {
    inner: Arc<StubInner>,
}

#[derive(Debug)]
struct StubInner {
    state: Mutex<StubState>,
    /// `true` while status requests may complete
    gate: watch::Sender<bool>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[derive(Debug)]
struct StubState {
    discovery: Result<DiscoveryResponse, String>,
    accepted_ids: VecDeque<String>,
    issued: usize,
    submit_failure: Option<String>,
    sync_response: SyncScanResponse,
    statuses: VecDeque<Result<StatusResponse, String>>,
    fallback: StatusResponse,
    history: Vec<JobSummary>,
    response_yields: usize,
    discover_calls: Vec<String>,
    async_submissions: Vec<GcpScanRequest>,
    sync_submissions: Vec<(String, String, Option<String>)>,
    status_calls: Vec<JobId>,
}

impl Default for StubTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl StubTransport {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            inner: Arc::new(StubInner {
                state: Mutex::new(StubState {
                    discovery: Ok(DiscoveryResponse {
                        projects: Vec::new(),
                        key_id: "key-1".into(),
                        warning: None,
                    }),
                    accepted_ids: VecDeque::new(),
                    issued: 0,
                    submit_failure: None,
                    sync_response: SyncScanResponse {
                        scan_id: "aws-1".into(),
                        findings_count: 0,
                    },
                    statuses: VecDeque::new(),
                    fallback: status(JobStatus::Running, 0, None),
                    history: Vec::new(),
                    response_yields: 0,
                    discover_calls: Vec::new(),
                    async_submissions: Vec::new(),
                    sync_submissions: Vec::new(),
                    status_calls: Vec::new(),
                }),
                gate,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }),
        }
    }

    /// Discovery answers with these projects under `key_id`
    pub fn with_projects(self, key_id: &str, projects: &[&str]) -> Self {
        self.inner.state.lock().discovery = Ok(DiscoveryResponse {
            projects: projects.iter().map(|p| p.to_string()).collect(),
            key_id: key_id.to_string(),
            warning: None,
        });
        self
    }

    pub fn with_discovery_warning(self, warning: &str) -> Self {
        if let Ok(discovery) = &mut self.inner.state.lock().discovery {
            discovery.warning = Some(warning.to_string());
        }
        self
    }

    pub fn fail_discovery(&self, message: &str) {
        self.inner.state.lock().discovery = Err(message.to_string());
    }

    /// Ids handed out by successive asynchronous submissions
    pub fn with_job_ids(self, ids: &[&str]) -> Self {
        self.inner
            .state
            .lock()
            .accepted_ids
            .extend(ids.iter().map(|id| id.to_string()));
        self
    }

    /// Fail every submission until cleared with `None`
    pub fn fail_submissions(&self, message: Option<&str>) {
        self.inner.state.lock().submit_failure = message.map(str::to_string);
    }

    pub fn with_sync_result(self, scan_id: &str, findings_count: u64) -> Self {
        self.inner.state.lock().sync_response = SyncScanResponse {
            scan_id: scan_id.to_string(),
            findings_count,
        };
        self
    }

    pub fn with_history(self, rows: Vec<JobSummary>) -> Self {
        self.inner.state.lock().history = rows;
        self
    }

    /// Queue one status answer
    pub fn push_status(
        &self,
        status_token: &str,
        progress: i64,
        result: Option<Value>,
    ) {
        self.inner.state.lock().statuses.push_back(Ok(status(
            JobStatus::from(status_token),
            progress,
            result,
        )));
    }

    /// Queue one failed status request
    pub fn push_status_failure(&self, message: &str) {
        self.inner
            .state
            .lock()
            .statuses
            .push_back(Err(message.to_string()));
    }

    /// Answer served once the queue is empty
    pub fn set_fallback_status(
        &self,
        status_token: &str,
        progress: i64,
        result: Option<Value>,
    ) {
        self.inner.state.lock().fallback =
            status(JobStatus::from(status_token), progress, result);
    }

    /// Yield to the scheduler this many times inside every status request,
    /// leaving room for other tasks to interleave while it is in flight
    pub fn set_response_yields(&self, yields: usize) {
        self.inner.state.lock().response_yields = yields;
    }

    /// Hold status requests in flight until [`Self::release_status`]
    pub fn hold_status(&self) {
        self.inner.gate.send_replace(false);
    }

    pub fn release_status(&self) {
        self.inner.gate.send_replace(true);
    }

    pub fn discover_calls(&self) -> usize {
        self.inner.state.lock().discover_calls.len()
    }

    pub fn async_submissions(&self) -> Vec<GcpScanRequest> {
        self.inner.state.lock().async_submissions.clone()
    }

    pub fn sync_submissions(&self) -> usize {
        self.inner.state.lock().sync_submissions.len()
    }

    /// Job ids of every status request issued, in order
    pub fn status_calls(&self) -> Vec<JobId> {
        self.inner.state.lock().status_calls.clone()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent status requests observed
    pub fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_job_id(&self) -> String {
        let mut state = self.inner.state.lock();
        state.issued += 1;
        let issued = state.issued;
        state
            .accepted_ids
            .pop_front()
            .unwrap_or_else(|| format!("job-{issued}"))
    }
}

fn status(
    status: JobStatus,
    progress: i64,
    result: Option<Value>,
) -> StatusResponse {
    StatusResponse {
        status,
        progress,
        result,
    }
}

fn worker_error(message: &str) -> TransportError {
    TransportError::Status {
        status: 503,
        message: message.to_string(),
    }
}

/// Decrements the in-flight counter even when the request is abandoned
struct InFlightGuard<'a>(&'a StubInner);

impl<'a> InFlightGuard<'a> {
    fn enter(inner: &'a StubInner) -> Self {
        let now = inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        inner.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(inner)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ScanTransport for StubTransport {
    async fn discover(
        &self,
        upload: &KeyUpload,
    ) -> TransportResult<DiscoveryResponse> {
        let mut state = self.inner.state.lock();
        state.discover_calls.push(upload.file_name.clone());
        state.discovery.clone().map_err(|msg| worker_error(&msg))
    }

    async fn submit_async(
        &self,
        request: &GcpScanRequest,
    ) -> TransportResult<AsyncScanAccepted> {
        {
            let mut state = self.inner.state.lock();
            state.async_submissions.push(request.clone());
            if let Some(message) = state.submit_failure.clone() {
                return Err(worker_error(&message));
            }
        }
        let scan_id = JobId::new(self.next_job_id())
            .map_err(|err| TransportError::Decode(err.to_string()))?;
        Ok(AsyncScanAccepted { scan_id })
    }

    async fn submit_sync(
        &self,
        request: &AwsScanRequest,
    ) -> TransportResult<SyncScanResponse> {
        let mut state = self.inner.state.lock();
        state.sync_submissions.push((
            request.access_key.clone(),
            request.region.clone(),
            request.checks.clone(),
        ));
        if let Some(message) = state.submit_failure.clone() {
            return Err(worker_error(&message));
        }
        Ok(state.sync_response.clone())
    }

    async fn fetch_status(
        &self,
        job_id: &JobId,
    ) -> TransportResult<StatusResponse> {
        let yields = {
            let mut state = self.inner.state.lock();
            state.status_calls.push(job_id.clone());
            state.response_yields
        };
        let _guard = InFlightGuard::enter(&self.inner);

        let mut gate = self.inner.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;
        for _ in 0..yields {
            tokio::task::yield_now().await;
        }

        let mut state = self.inner.state.lock();
        match state.statuses.pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(worker_error(&message)),
            None => Ok(state.fallback.clone()),
        }
    }

    async fn fetch_history(&self) -> TransportResult<Vec<JobSummary>> {
        Ok(self.inner.state.lock().history.clone())
    }
}

/// Memory slot whose writes and removals can be made to fail
#[derive(Debug, Default)]
pub struct FlakyHandleSlot {
    inner: MemoryHandleSlot,
    fail_writes: AtomicBool,
    fail_removes: AtomicBool,
}

impl FlakyHandleSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(value: impl Into<String>) -> Self {
        Self {
            inner: MemoryHandleSlot::with_value(value),
            ..Self::default()
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_removes(&self, fail: bool) {
        self.fail_removes.store(fail, Ordering::SeqCst);
    }

    pub fn peek(&self) -> Option<String> {
        self.inner.peek()
    }

    pub fn write_count(&self) -> usize {
        self.inner.write_count()
    }

    fn injected(&self) -> HandleStoreError {
        HandleStoreError::Io {
            path: "memory://active_job".into(),
            source: std::io::Error::other("injected storage failure"),
        }
    }
}

#[async_trait]
impl HandleSlot for FlakyHandleSlot {
    async fn load(&self) -> Result<Option<String>, HandleStoreError> {
        self.inner.load().await
    }

    async fn store(&self, value: &str) -> Result<(), HandleStoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(self.injected());
        }
        self.inner.store(value).await
    }

    async fn remove(&self) -> Result<(), HandleStoreError> {
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(self.injected());
        }
        self.inner.remove().await
    }
}
