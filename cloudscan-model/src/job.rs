use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ids::JobId, provider::ProviderKind, status::JobStatus};

/// One remote scan execution as seen by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanJob {
    pub id: JobId,
    /// `None` when the job was recovered from the persisted handle, which
    /// only records the id.
    pub provider: Option<ProviderKind>,
    /// Percentage in `0..=100`.
    pub progress: u8,
    pub status: JobStatus,
    /// Set only once the job is terminal.
    pub result: Option<Value>,
}

impl ScanJob {
    /// A job the worker has just accepted.
    pub fn submitted(id: JobId, provider: ProviderKind) -> Self {
        ScanJob {
            id,
            provider: Some(provider),
            progress: 0,
            status: JobStatus::Running,
            result: None,
        }
    }

    /// A job picked back up from the persisted handle after a restart.
    pub fn resumed(id: JobId) -> Self {
        ScanJob {
            id,
            provider: None,
            progress: 0,
            status: JobStatus::Running,
            result: None,
        }
    }

    /// A job whose result came back with the submission response.
    pub fn finished(id: JobId, provider: ProviderKind, result: Value) -> Self {
        ScanJob {
            id,
            provider: Some(provider),
            progress: 100,
            status: JobStatus::Completed,
            result: Some(result),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Clamp a wire progress value into a percentage.
pub fn clamp_progress(raw: i64) -> u8 {
    raw.clamp(0, 100) as u8
}
