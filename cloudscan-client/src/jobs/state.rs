//! Observable tracking state
//!
//! The client publishes a single [`TrackingState`] over a `watch` channel.
//! Terminal observers registered through
//! [`JobClient::on_terminal`](crate::JobClient::on_terminal) run once per job,
//! after the terminal state has been published.

use cloudscan_model::{JobId, JobStatus, ScanJob};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::JobClientError;

/// Result of a finished job
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// Finished normally. The payload is absent when the worker reported
    /// `completed` without attaching a result.
    Completed(Option<Value>),
    /// Finished with an error status
    Failed {
        message: String,
        payload: Option<Value>,
    },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Completed(_))
    }
}

/// Emitted exactly once when a job reaches a terminal state
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalEvent {
    pub job: ScanJob,
    pub outcome: JobOutcome,
}

impl TerminalEvent {
    /// Error view of a failed outcome
    pub fn error(&self) -> Option<JobClientError> {
        match &self.outcome {
            JobOutcome::Completed(_) => None,
            JobOutcome::Failed { message, .. } => {
                Some(JobClientError::JobFailed {
                    job_id: self.job.id.clone(),
                    message: message.clone(),
                })
            }
        }
    }
}

/// Why tracking stopped without the job finishing
#[derive(Debug, Clone, PartialEq)]
pub enum SuspendReason {
    /// The user stopped tracking; the handle is kept for a later resume
    Cancelled,
    /// Status polling failed too many times in a row
    TransportFailures { failures: u32, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingPhase {
    Idle,
    Active,
    Terminal,
    Suspended,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum TrackingState {
    #[default]
    Idle,
    Active {
        job: ScanJob,
        consecutive_failures: u32,
        last_error: Option<String>,
    },
    Terminal(TerminalEvent),
    Suspended {
        job: ScanJob,
        reason: SuspendReason,
    },
}

impl TrackingState {
    pub(crate) fn active(job: ScanJob) -> Self {
        TrackingState::Active {
            job,
            consecutive_failures: 0,
            last_error: None,
        }
    }

    pub fn phase(&self) -> TrackingPhase {
        match self {
            TrackingState::Idle => TrackingPhase::Idle,
            TrackingState::Active { .. } => TrackingPhase::Active,
            TrackingState::Terminal(_) => TrackingPhase::Terminal,
            TrackingState::Suspended { .. } => TrackingPhase::Suspended,
        }
    }

    pub fn job(&self) -> Option<&ScanJob> {
        match self {
            TrackingState::Idle => None,
            TrackingState::Active { job, .. }
            | TrackingState::Suspended { job, .. } => Some(job),
            TrackingState::Terminal(event) => Some(&event.job),
        }
    }

    pub fn is_active_for(&self, job_id: &JobId) -> bool {
        matches!(self, TrackingState::Active { job, .. } if &job.id == job_id)
    }

    /// Error carried by a failed or suspended state
    pub fn error(&self) -> Option<JobClientError> {
        match self {
            TrackingState::Terminal(event) => event.error(),
            TrackingState::Suspended {
                job,
                reason: SuspendReason::TransportFailures { failures, message },
            } => Some(JobClientError::PollTransport {
                job_id: job.id.clone(),
                failures: *failures,
                message: message.clone(),
            }),
            _ => None,
        }
    }
}

/// Point-in-time view of the tracked job
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub job_id: Option<JobId>,
    pub progress: u8,
    pub status: Option<JobStatus>,
    pub phase: TrackingPhase,
}

impl From<&TrackingState> for ProgressSnapshot {
    fn from(state: &TrackingState) -> Self {
        let job = state.job();
        ProgressSnapshot {
            job_id: job.map(|job| job.id.clone()),
            progress: job.map_or(0, |job| job.progress),
            status: job.map(|job| job.status.clone()),
            phase: state.phase(),
        }
    }
}

/// Outcome of [`JobClient::submit_job`](crate::JobClient::submit_job)
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// Asynchronous job accepted and now being polled
    Tracking(JobId),
    /// Synchronous job whose result came back with the submission
    Finished(TerminalEvent),
}

pub(crate) type TerminalListener = Arc<dyn Fn(&TerminalEvent) + Send + Sync>;

/// Publishes tracking state and dispatches terminal observers
pub(crate) struct TrackingHub {
    tx: watch::Sender<TrackingState>,
    listeners: Mutex<Vec<TerminalListener>>,
}

impl std::fmt::Debug for TrackingHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingHub")
            .field("state", &*self.tx.borrow())
            .field("listeners", &self.listeners.lock().len())
            .finish()
    }
}

impl TrackingHub {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(TrackingState::Idle);
        Self {
            tx,
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<TrackingState> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> TrackingState {
        self.tx.borrow().clone()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot::from(&*self.tx.borrow())
    }

    pub fn publish(&self, state: TrackingState) {
        self.tx.send_replace(state);
    }

    /// Replace the state only while `job_id` is the active job. Returns
    /// whether the state was replaced.
    pub fn publish_for(&self, job_id: &JobId, state: TrackingState) -> bool {
        let mut next = Some(state);
        self.tx.send_if_modified(|current| {
            if !current.is_active_for(job_id) {
                return false;
            }
            if let Some(state) = next.take() {
                *current = state;
            }
            true
        })
    }

    /// Move the active job to terminal and notify observers. Does nothing
    /// unless `event.job` is still the active job, so a job can only reach
    /// its observers once.
    pub fn finish(&self, event: TerminalEvent) -> bool {
        let job_id = event.job.id.clone();
        if !self.publish_for(&job_id, TrackingState::Terminal(event.clone())) {
            return false;
        }
        self.notify(&event);
        true
    }

    /// Suspend the active job, keeping what is known about it
    pub fn suspend(&self, job_id: &JobId, reason: SuspendReason) -> bool {
        let mut reason = Some(reason);
        self.tx.send_if_modified(|current| {
            let TrackingState::Active { job, .. } = current else {
                return false;
            };
            if &job.id != job_id {
                return false;
            }
            let job = job.clone();
            if let Some(reason) = reason.take() {
                *current = TrackingState::Suspended { job, reason };
            }
            true
        })
    }

    /// Publish a terminal event that never went through polling
    pub fn finish_immediately(&self, event: TerminalEvent) {
        self.publish(TrackingState::Terminal(event.clone()));
        self.notify(&event);
    }

    pub fn add_listener(&self, listener: TerminalListener) {
        self.listeners.lock().push(listener);
    }

    fn notify(&self, event: &TerminalEvent) {
        // Snapshot so a listener may register further listeners.
        let listeners: Vec<TerminalListener> = self.listeners.lock().clone();
        for listener in listeners {
            listener(event);
        }
    }
}
