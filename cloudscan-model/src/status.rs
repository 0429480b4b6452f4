use serde::{Deserialize, Serialize};

/// Lifecycle token reported by the remote worker.
///
/// Unknown tokens are kept verbatim so a newer worker does not break older
/// clients; they are treated as non-terminal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[derive(Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    #[default]
    Queued,
    Uploaded,
    Running,
    Completed,
    Error,
    Other(String),
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Uploaded => "uploaded",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
            JobStatus::Other(token) => token,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, JobStatus::Completed)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, JobStatus::Error)
    }

    /// Status alone marks the job as finished.
    pub fn is_terminal(&self) -> bool {
        self.is_completed() || self.is_error()
    }
}

impl From<String> for JobStatus {
    fn from(token: String) -> Self {
        match token.trim().to_ascii_lowercase().as_str() {
            "queued" | "pending" => JobStatus::Queued,
            "uploaded" => JobStatus::Uploaded,
            "running" | "scanning" => JobStatus::Running,
            "completed" | "complete" => JobStatus::Completed,
            "error" | "failed" => JobStatus::Error,
            _ => JobStatus::Other(token),
        }
    }
}

impl From<&str> for JobStatus {
    fn from(token: &str) -> Self {
        JobStatus::from(token.to_string())
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Other(token) => token,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
