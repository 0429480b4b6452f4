use cloudscan_model::{JobId, ModelError};
use thiserror::Error;

use crate::config::ConfigError;
use crate::infra::services::transport::TransportError;
use crate::infra::storage::HandleStoreError;

/// Coarse classification of [`JobClientError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Credential could not be turned into a submittable context
    DiscoveryFailure,
    /// The worker did not accept the job
    SubmissionFailure,
    /// Status polling gave up after repeated transport failures
    PollTransportFailure,
    /// The job finished with an error status
    TerminalWithError,
    /// Persisted handle could not be read or written
    Storage,
    /// Job history could not be fetched
    HistoryFailure,
    /// Client could not be constructed from its configuration
    Configuration,
}

#[derive(Debug, Error)]
pub enum JobClientError {
    #[error("malformed credential artifact: {0}")]
    MalformedArtifact(String),

    #[error("no target selected from the discovered set")]
    TargetNotSelected,

    #[error("target '{0}' is not one of the discovered targets")]
    UnknownTarget(String),

    #[error("discovery failed: {0}")]
    Discovery(#[source] TransportError),

    #[error("submission failed: {0}")]
    Submission(#[source] TransportError),

    #[error("worker returned an unusable job id")]
    InvalidJobId(#[source] ModelError),

    #[error("polling job {job_id} stopped after {failures} failed attempts: {message}")]
    PollTransport {
        job_id: JobId,
        failures: u32,
        message: String,
    },

    #[error("job {job_id} failed: {message}")]
    JobFailed { job_id: JobId, message: String },

    #[error("job handle storage failed: {0}")]
    Storage(#[from] HandleStoreError),

    #[error("history request failed: {0}")]
    History(#[source] TransportError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build transport: {0}")]
    Transport(#[source] TransportError),
}

impl JobClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobClientError::MalformedArtifact(_)
            | JobClientError::TargetNotSelected
            | JobClientError::UnknownTarget(_)
            | JobClientError::Discovery(_) => ErrorKind::DiscoveryFailure,
            JobClientError::Submission(_) | JobClientError::InvalidJobId(_) => {
                ErrorKind::SubmissionFailure
            }
            JobClientError::PollTransport { .. } => {
                ErrorKind::PollTransportFailure
            }
            JobClientError::JobFailed { .. } => ErrorKind::TerminalWithError,
            JobClientError::Storage(_) => ErrorKind::Storage,
            JobClientError::History(_) => ErrorKind::HistoryFailure,
            JobClientError::Config(_) | JobClientError::Transport(_) => {
                ErrorKind::Configuration
            }
        }
    }
}

pub type Result<T, E = JobClientError> = std::result::Result<T, E>;
