use cloudscan_model::{JobId, ProviderKind, ScanJob};
use std::sync::Arc;
use tracing::{info, warn};

use super::context::JobContext;
use super::handle::JobHandleStore;
use super::scheduler::PollingScheduler;
use super::state::{
    JobOutcome, Submission, SuspendReason, TerminalEvent, TrackingHub,
};
use crate::error::{JobClientError, Result};
use crate::infra::services::transport::{
    AwsScanRequest, GcpScanRequest, ScanTransport,
};

/// Issues job-creation requests and hands accepted jobs to the poller
#[derive(Debug)]
pub struct JobSubmitter {
    transport: Arc<dyn ScanTransport>,
    handle: JobHandleStore,
    scheduler: Arc<PollingScheduler>,
    hub: Arc<TrackingHub>,
}

impl JobSubmitter {
    pub(crate) fn new(
        transport: Arc<dyn ScanTransport>,
        handle: JobHandleStore,
        scheduler: Arc<PollingScheduler>,
        hub: Arc<TrackingHub>,
    ) -> Self {
        Self {
            transport,
            handle,
            scheduler,
            hub,
        }
    }

    /// Submit a ready context.
    ///
    /// Nothing is written and no tracking state changes unless the worker
    /// accepts the job.
    pub async fn submit(&self, context: &JobContext) -> Result<Submission> {
        match context {
            JobContext::SingleStep(ctx) => {
                let request = AwsScanRequest {
                    access_key: ctx.access_key.clone(),
                    secret_key: ctx.secret_key.clone(),
                    region: ctx.region.clone(),
                    checks: ctx.checks.clone(),
                };
                info!(
                    "[Submitter] Running synchronous {} scan in region {}",
                    ProviderKind::Aws,
                    ctx.region
                );
                let response = self
                    .transport
                    .submit_sync(&request)
                    .await
                    .map_err(JobClientError::Submission)?;
                let job_id = JobId::new(response.scan_id.clone())
                    .map_err(JobClientError::InvalidJobId)?;

                let result = response.to_result();
                let event = TerminalEvent {
                    job: ScanJob::finished(
                        job_id,
                        ProviderKind::Aws,
                        result.clone(),
                    ),
                    outcome: JobOutcome::Completed(Some(result)),
                };
                self.replace_tracked_job().await;
                self.hub.finish_immediately(event.clone());
                Ok(Submission::Finished(event))
            }
            JobContext::TwoStep(ctx) => {
                let project_id = ctx
                    .selected
                    .clone()
                    .ok_or(JobClientError::TargetNotSelected)?;
                let request = GcpScanRequest {
                    key_id: ctx.discovery_ref.clone(),
                    project_id,
                    checks: ctx.checks.clone(),
                };
                let accepted = self
                    .transport
                    .submit_async(&request)
                    .await
                    .map_err(JobClientError::Submission)?;
                let job_id = accepted.scan_id;
                info!(
                    "[Submitter] Worker accepted job {} for project {}",
                    job_id, request.project_id
                );

                // Persist before touching the current session: a failed write
                // leaves the previous job tracked as it was.
                if let Err(err) = self.handle.write(&job_id).await {
                    warn!(
                        "[Submitter] Could not persist accepted job {}: {}",
                        job_id, err
                    );
                    return Err(err.into());
                }
                self.replace_tracked_job().await;
                self.scheduler
                    .start(ScanJob::submitted(job_id.clone(), ProviderKind::Gcp))
                    .await;
                Ok(Submission::Tracking(job_id))
            }
        }
    }

    async fn replace_tracked_job(&self) {
        if let Some(previous) = self.scheduler.stop().await {
            warn!(
                "[Submitter] Stopped tracking job {} to track a new submission",
                previous
            );
            self.hub.suspend(&previous, SuspendReason::Cancelled);
        }
    }
}
