use cloudscan_model::{JobSummary, ScanJob};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

use super::context::{ContextResolver, CredentialArtifact, JobContext};
use super::handle::JobHandleStore;
use super::scheduler::{PollSettings, PollingScheduler};
use super::state::{
    ProgressSnapshot, Submission, SuspendReason, TerminalEvent, TrackingHub,
    TrackingState,
};
use super::submitter::JobSubmitter;
use crate::config::{ClientConfig, DEFAULT_POLL_INTERVAL};
use crate::error::{JobClientError, Result};
use crate::infra::api_client::ApiClient;
use crate::infra::services::transport::ScanTransport;
use crate::infra::storage::{HandleSlot, MemoryHandleSlot};
use crate::infra::time::{SystemTimeProvider, TimeProvider};

/// Resumable client for one remote scan job at a time
///
/// Owns the resolver, submitter, persisted handle and poller. Instances are
/// independent; build one per front end (or per test) with
/// [`JobClient::builder`] or [`JobClient::from_config`].
#[derive(Debug)]
pub struct JobClient {
    transport: Arc<dyn ScanTransport>,
    resolver: ContextResolver,
    submitter: JobSubmitter,
    scheduler: Arc<PollingScheduler>,
    handle: JobHandleStore,
    hub: Arc<TrackingHub>,
}

impl JobClient {
    pub fn builder(transport: Arc<dyn ScanTransport>) -> JobClientBuilder {
        JobClientBuilder::new(transport)
    }

    /// Client talking HTTP to the configured worker, persisting its handle
    /// under the configured state directory
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport =
            ApiClient::new(&config.server_url, config.request_timeout)
                .map_err(JobClientError::Transport)?;
        let slot = config.handle_slot()?;
        Ok(JobClient::builder(Arc::new(transport))
            .handle_slot(Arc::new(slot))
            .poll_interval(config.poll_interval)
            .max_consecutive_failures(config.max_consecutive_failures)
            .build())
    }

    /// Turn a credential into a job context, running discovery if needed
    pub async fn resolve(
        &self,
        artifact: CredentialArtifact,
    ) -> Result<JobContext> {
        self.resolver.resolve(artifact).await
    }

    pub async fn submit_job(&self, context: &JobContext) -> Result<Submission> {
        self.submitter.submit(context).await
    }

    pub fn current_progress(&self) -> ProgressSnapshot {
        self.hub.snapshot()
    }

    pub fn state(&self) -> TrackingState {
        self.hub.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<TrackingState> {
        self.hub.subscribe()
    }

    /// Register an observer that runs once for every job that finishes
    pub fn on_terminal<F>(&self, callback: F)
    where
        F: Fn(&TerminalEvent) + Send + Sync + 'static,
    {
        self.hub.add_listener(Arc::new(callback));
    }

    /// Pick up a job recorded by an earlier process. Returns whether the
    /// persisted job is being polled afterwards; a job that is already
    /// polled keeps its session and progress.
    pub async fn resume_if_pending(&self) -> Result<bool> {
        let Some(job_id) = self.handle.read().await? else {
            return Ok(false);
        };
        if self.scheduler.polling_job().await.as_ref() == Some(&job_id) {
            debug!("[JobClient] Job {} is already being tracked", job_id);
            return Ok(true);
        }
        info!("[JobClient] Resuming job {} from persisted handle", job_id);
        self.scheduler.start(ScanJob::resumed(job_id)).await;
        Ok(true)
    }

    /// Stop polling but keep the handle so a later resume continues the job.
    /// Returns whether a running session was stopped.
    pub async fn cancel_tracking(&self) -> bool {
        let Some(job_id) = self.scheduler.stop().await else {
            return false;
        };
        info!("[JobClient] Stopped tracking job {}", job_id);
        self.hub.suspend(&job_id, SuspendReason::Cancelled);
        true
    }

    /// Forget the tracked job entirely, including the persisted handle. If
    /// the handle cannot be cleared nothing else changes.
    pub async fn reset(&self) -> Result<()> {
        self.handle.clear().await?;
        self.scheduler.stop().await;
        self.hub.publish(TrackingState::Idle);
        info!("[JobClient] Reset job tracking");
        Ok(())
    }

    pub async fn is_polling(&self) -> bool {
        self.scheduler.is_polling().await
    }

    /// Past jobs known to the worker
    pub async fn history(&self) -> Result<Vec<JobSummary>> {
        self.transport
            .fetch_history()
            .await
            .map_err(JobClientError::History)
    }
}

pub struct JobClientBuilder {
    transport: Arc<dyn ScanTransport>,
    slot: Option<Arc<dyn HandleSlot>>,
    clock: Option<Arc<dyn TimeProvider>>,
    settings: PollSettings,
}

impl std::fmt::Debug for JobClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobClientBuilder")
            .field("transport", &self.transport)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl JobClientBuilder {
    fn new(transport: Arc<dyn ScanTransport>) -> Self {
        Self {
            transport,
            slot: None,
            clock: None,
            settings: PollSettings {
                interval: DEFAULT_POLL_INTERVAL,
                max_consecutive_failures: None,
            },
        }
    }

    /// Where the active job id is persisted. Defaults to an in-memory slot,
    /// which does not survive a restart.
    pub fn handle_slot(mut self, slot: Arc<dyn HandleSlot>) -> Self {
        self.slot = Some(slot);
        self
    }

    pub fn time_provider(mut self, clock: Arc<dyn TimeProvider>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.settings.interval = interval;
        self
    }

    pub fn max_consecutive_failures(mut self, max: Option<u32>) -> Self {
        self.settings.max_consecutive_failures = max.filter(|max| *max > 0);
        self
    }

    pub fn build(self) -> JobClient {
        let slot = self.slot.unwrap_or_else(|| {
            Arc::new(MemoryHandleSlot::new()) as Arc<dyn HandleSlot>
        });
        let clock = self.clock.unwrap_or_else(|| {
            Arc::new(SystemTimeProvider) as Arc<dyn TimeProvider>
        });
        let handle = JobHandleStore::new(slot);
        let hub = Arc::new(TrackingHub::new());
        let scheduler = Arc::new(PollingScheduler::new(
            Arc::clone(&self.transport),
            clock,
            handle.clone(),
            Arc::clone(&hub),
            self.settings,
        ));
        let submitter = JobSubmitter::new(
            Arc::clone(&self.transport),
            handle.clone(),
            Arc::clone(&scheduler),
            Arc::clone(&hub),
        );

        JobClient {
            resolver: ContextResolver::new(Arc::clone(&self.transport)),
            transport: self.transport,
            submitter,
            scheduler,
            handle,
            hub,
        }
    }
}
