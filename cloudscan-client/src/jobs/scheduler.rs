//! Polling scheduler
//!
//! Runs at most one status loop per client. The loop sleeps one interval,
//! asks the worker for the job's status, folds the answer in and repeats.
//! A request is always awaited before the next timer is armed, so requests
//! are never pipelined.
//!
//! Stopping is cooperative: the loop watches a stop signal while it sleeps
//! and while a request is outstanding, and abandons the request when told
//! to stop. [`PollingScheduler::start`] and [`PollingScheduler::stop`] wait
//! for the previous loop to exit, which is what keeps a stale loop from
//! publishing over a newer job.

use cloudscan_model::{JobId, ScanJob};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::handle::JobHandleStore;
use super::interpreter::{Interpretation, interpret};
use super::state::{SuspendReason, TrackingHub, TrackingState};
use crate::infra::services::transport::ScanTransport;
use crate::infra::time::TimeProvider;

/// Polling parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    /// Consecutive failed ticks before the session is suspended
    pub max_consecutive_failures: Option<u32>,
}

#[derive(Debug)]
struct PollContext {
    transport: Arc<dyn ScanTransport>,
    clock: Arc<dyn TimeProvider>,
    handle: JobHandleStore,
    hub: Arc<TrackingHub>,
    settings: PollSettings,
}

#[derive(Debug)]
struct PollingSession {
    job_id: JobId,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

#[derive(Debug)]
pub struct PollingScheduler {
    ctx: Arc<PollContext>,
    session: Mutex<Option<PollingSession>>,
}

impl PollingScheduler {
    pub(crate) fn new(
        transport: Arc<dyn ScanTransport>,
        clock: Arc<dyn TimeProvider>,
        handle: JobHandleStore,
        hub: Arc<TrackingHub>,
        settings: PollSettings,
    ) -> Self {
        Self {
            ctx: Arc::new(PollContext {
                transport,
                clock,
                handle,
                hub,
                settings,
            }),
            session: Mutex::new(None),
        }
    }

    /// Begin polling `job`, replacing any running session. The job is
    /// published as active before this returns.
    pub async fn start(&self, job: ScanJob) {
        let mut session = self.session.lock().await;
        if let Some(previous) = session.take() {
            shutdown(previous).await;
        }

        info!(
            "[Poller] Tracking job {} every {:?}",
            job.id, self.ctx.settings.interval
        );
        self.ctx.hub.publish(TrackingState::active(job.clone()));

        let (stop_tx, stop_rx) = watch::channel(false);
        let job_id = job.id.clone();
        let task = tokio::spawn(run(Arc::clone(&self.ctx), job, stop_rx));
        *session = Some(PollingSession {
            job_id,
            stop_tx,
            task,
        });
    }

    /// Stop polling and wait for the loop to exit. Returns the job whose
    /// loop was still running, if any. Tracked state and the handle are left
    /// untouched.
    pub async fn stop(&self) -> Option<JobId> {
        let mut session = self.session.lock().await;
        let previous = session.take()?;
        let was_running = !previous.task.is_finished();
        let job_id = previous.job_id.clone();
        shutdown(previous).await;
        was_running.then_some(job_id)
    }

    /// Whether a loop is currently running
    pub async fn is_polling(&self) -> bool {
        self.polling_job().await.is_some()
    }

    /// Job whose loop is currently running
    pub async fn polling_job(&self) -> Option<JobId> {
        self.session
            .lock()
            .await
            .as_ref()
            .filter(|session| !session.task.is_finished())
            .map(|session| session.job_id.clone())
    }
}

async fn shutdown(session: PollingSession) {
    let _ = session.stop_tx.send(true);
    if let Err(err) = session.task.await
        && err.is_panic()
    {
        warn!(
            "[Poller] Polling task for job {} panicked",
            session.job_id
        );
    }
    debug!("[Poller] Session for job {} stopped", session.job_id);
}

async fn run(
    ctx: Arc<PollContext>,
    mut job: ScanJob,
    mut stop_rx: watch::Receiver<bool>,
) {
    let started = ctx.clock.now();
    let started_at = ctx.clock.utc_now();
    let mut failures: u32 = 0;

    loop {
        tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            _ = ctx.clock.sleep(ctx.settings.interval) => {}
        }
        if *stop_rx.borrow() {
            break;
        }

        let response = tokio::select! {
            biased;
            _ = stop_rx.changed() => {
                debug!("[Poller] Abandoning in-flight status request for {}", job.id);
                break;
            }
            response = ctx.transport.fetch_status(&job.id) => response,
        };
        if *stop_rx.borrow() {
            debug!("[Poller] Discarding status for stopped job {}", job.id);
            break;
        }

        match response {
            Ok(response) => {
                failures = 0;
                match interpret(&job, &response) {
                    Interpretation::Progress(updated) => {
                        debug!(
                            "[Poller] Job {} at {}% ({})",
                            updated.id,
                            updated.progress,
                            updated.status.as_str()
                        );
                        job = updated;
                        ctx.hub
                            .publish_for(&job.id, TrackingState::active(job.clone()));
                    }
                    Interpretation::Terminal(event) => {
                        // Handle first: once observers run, a restart must not
                        // resume this job.
                        if let Err(err) = ctx.handle.clear_for(&event.job.id).await
                        {
                            warn!(
                                "[Poller] Failed to clear handle for finished job {}: {}",
                                event.job.id, err
                            );
                        }
                        let elapsed = ctx.clock.now().duration_since(started);
                        info!(
                            "[Poller] Job {} finished with status {} after {} (tracked since {})",
                            event.job.id,
                            event.job.status.as_str(),
                            humantime::format_duration(elapsed),
                            started_at.format("%Y-%m-%d %H:%M:%S UTC")
                        );
                        ctx.hub.finish(event);
                        break;
                    }
                }
            }
            Err(err) => {
                failures += 1;
                warn!(
                    "[Poller] Status request for job {} failed ({} in a row): {}",
                    job.id, failures, err
                );
                let message = err.to_string();

                if let Some(max) = ctx.settings.max_consecutive_failures
                    && failures >= max
                {
                    warn!(
                        "[Poller] Suspending job {} after {} failed attempts",
                        job.id, failures
                    );
                    ctx.hub.publish_for(
                        &job.id,
                        TrackingState::Suspended {
                            job: job.clone(),
                            reason: SuspendReason::TransportFailures {
                                failures,
                                message,
                            },
                        },
                    );
                    break;
                }

                ctx.hub.publish_for(
                    &job.id,
                    TrackingState::Active {
                        job: job.clone(),
                        consecutive_failures: failures,
                        last_error: Some(message),
                    },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::storage::{HandleSlot, MemoryHandleSlot};
    use crate::infra::testing::{StubTransport, VirtualTimeProvider};
    use crate::jobs::state::TrackingPhase;
    use cloudscan_model::ProviderKind;

    const INTERVAL: Duration = Duration::from_secs(2);

    async fn settle() {
        for _ in 0..32 {
            tokio::task::yield_now().await;
        }
    }

    struct Harness {
        stub: StubTransport,
        clock: VirtualTimeProvider,
        slot: Arc<MemoryHandleSlot>,
        hub: Arc<TrackingHub>,
        scheduler: PollingScheduler,
    }

    fn harness(max_failures: Option<u32>) -> Harness {
        let stub = StubTransport::new();
        let clock = VirtualTimeProvider::new();
        let slot = Arc::new(MemoryHandleSlot::new());
        let hub = Arc::new(TrackingHub::new());
        let scheduler = PollingScheduler::new(
            Arc::new(stub.clone()),
            Arc::new(clock.clone()),
            JobHandleStore::new(slot.clone()),
            Arc::clone(&hub),
            PollSettings {
                interval: INTERVAL,
                max_consecutive_failures: max_failures,
            },
        );
        Harness {
            stub,
            clock,
            slot,
            hub,
            scheduler,
        }
    }

    fn job(id: &str) -> ScanJob {
        ScanJob::submitted(JobId::new(id).unwrap(), ProviderKind::Gcp)
    }

    #[tokio::test]
    async fn first_request_waits_one_interval() {
        let h = harness(None);
        h.scheduler.start(job("j-1")).await;
        settle().await;

        assert_eq!(h.hub.snapshot().phase, TrackingPhase::Active);
        assert!(h.stub.status_calls().is_empty());
        assert_eq!(h.clock.pending_timers(), 1);

        h.clock.advance(INTERVAL);
        settle().await;
        assert_eq!(h.stub.status_calls().len(), 1);
    }

    #[tokio::test]
    async fn stop_disarms_timer_and_keeps_state() {
        let h = harness(None);
        h.stub.push_status("running", 30, None);
        h.scheduler.start(job("j-1")).await;
        settle().await;
        h.clock.advance(INTERVAL);
        settle().await;

        assert_eq!(h.scheduler.stop().await.unwrap().as_str(), "j-1");
        assert_eq!(h.clock.pending_timers(), 0);
        assert!(!h.scheduler.is_polling().await);
        assert_eq!(h.hub.snapshot().progress, 30);

        h.clock.advance(INTERVAL * 5);
        settle().await;
        assert_eq!(h.stub.status_calls().len(), 1);
    }

    #[tokio::test]
    async fn response_arriving_after_stop_is_discarded() {
        let h = harness(None);
        h.stub.push_status("completed", 100, None);
        h.stub.hold_status();
        h.scheduler.start(job("j-1")).await;
        settle().await;
        h.clock.advance(INTERVAL);
        settle().await;
        assert_eq!(h.stub.in_flight(), 1);

        h.scheduler.stop().await;
        h.stub.release_status();
        settle().await;

        assert_eq!(h.stub.in_flight(), 0);
        assert_eq!(h.hub.snapshot().phase, TrackingPhase::Active);
    }

    #[tokio::test]
    async fn failures_keep_polling_until_threshold() {
        let h = harness(Some(2));
        h.slot.store("j-1").await.unwrap();
        h.stub.push_status_failure("bad gateway");
        h.stub.push_status("running", 20, None);
        h.stub.push_status_failure("bad gateway");
        h.stub.push_status_failure("bad gateway");
        h.scheduler.start(job("j-1")).await;
        settle().await;

        h.clock.advance(INTERVAL);
        settle().await;
        match h.hub.current() {
            TrackingState::Active {
                consecutive_failures,
                last_error,
                ..
            } => {
                assert_eq!(consecutive_failures, 1);
                assert!(last_error.unwrap().contains("bad gateway"));
            }
            other => panic!("expected active state, got {other:?}"),
        }

        // A success resets the counter.
        h.clock.advance(INTERVAL);
        settle().await;
        h.clock.advance(INTERVAL);
        settle().await;
        assert_eq!(h.hub.snapshot().phase, TrackingPhase::Active);

        h.clock.advance(INTERVAL);
        settle().await;
        match h.hub.current() {
            TrackingState::Suspended {
                reason: SuspendReason::TransportFailures { failures, .. },
                ..
            } => assert_eq!(failures, 2),
            other => panic!("expected suspension, got {other:?}"),
        }
        assert_eq!(h.slot.peek().as_deref(), Some("j-1"));
        assert_eq!(h.clock.pending_timers(), 0);
    }

    #[tokio::test]
    async fn restart_replaces_previous_session() {
        let h = harness(None);
        h.scheduler.start(job("j-1")).await;
        settle().await;
        h.scheduler.start(job("j-2")).await;
        settle().await;
        assert_eq!(h.clock.pending_timers(), 1);

        h.clock.advance(INTERVAL);
        settle().await;
        let calls = h.stub.status_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].as_str(), "j-2");
    }
}
