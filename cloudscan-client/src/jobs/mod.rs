//! Job lifecycle: resolve a credential, submit, persist the handle, poll
//! until terminal, resume after a restart.

pub mod client;
pub mod context;
pub mod handle;
pub mod interpreter;
pub mod scheduler;
pub mod state;
pub mod submitter;

pub use client::{JobClient, JobClientBuilder};
pub use context::{
    ContextResolver, CredentialArtifact, JobContext, SingleStepContext,
    TwoStepContext,
};
pub use handle::JobHandleStore;
pub use scheduler::{PollSettings, PollingScheduler};
pub use state::{
    JobOutcome, ProgressSnapshot, Submission, SuspendReason, TerminalEvent,
    TrackingPhase, TrackingState,
};
pub use submitter::JobSubmitter;
