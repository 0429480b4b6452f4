//! Status interpretation
//!
//! Folds one status answer into the tracked job and decides whether the job
//! is finished. A job is terminal when the worker says `completed` or
//! `error`, or when progress has reached 100 and a non-empty result is
//! attached. Progress 100 on its own is not enough: the worker reports 100
//! while it is still persisting findings.

use cloudscan_model::{JobStatus, ScanJob, StatusResponse, job::clamp_progress};
use serde_json::Value;

use super::state::{JobOutcome, TerminalEvent};

const DEFAULT_FAILURE_MESSAGE: &str = "scan failed";

#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
    /// Still running; carries the updated job
    Progress(ScanJob),
    Terminal(TerminalEvent),
}

pub fn interpret(job: &ScanJob, response: &StatusResponse) -> Interpretation {
    let mut job = job.clone();
    job.progress = clamp_progress(response.progress);
    job.status = response.status.clone();
    let payload = response.result_payload().cloned();

    if job.status.is_error() {
        let message = payload
            .as_ref()
            .and_then(error_message)
            .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string());
        job.result = payload.clone();
        return Interpretation::Terminal(TerminalEvent {
            job,
            outcome: JobOutcome::Failed { message, payload },
        });
    }

    let finished_by_result = response.progress >= 100 && payload.is_some();
    if job.status.is_completed() || finished_by_result {
        job.status = JobStatus::Completed;
        job.progress = 100;
        job.result = payload.clone();
        return Interpretation::Terminal(TerminalEvent {
            job,
            outcome: JobOutcome::Completed(payload),
        });
    }

    Interpretation::Progress(job)
}

fn error_message(payload: &Value) -> Option<String> {
    match payload {
        Value::String(text) => Some(text.clone()),
        Value::Object(map) => map
            .get("error")
            .or_else(|| map.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}
