//! CloudScan job client
//!
//! Launches cloud-security scans on a remote worker, follows their progress
//! by polling, and survives restarts by persisting the id of the job in
//! flight.
//!
//! ```no_run
//! use cloudscan_client::{ClientConfig, CredentialArtifact, JobClient};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = JobClient::from_config(&ClientConfig::load()?)?;
//! if !client.resume_if_pending().await? {
//!     let artifact = CredentialArtifact::read_key_file("sa.json".as_ref()).await?;
//!     let mut context = client.resolve(artifact).await?;
//!     context.select("my-project")?;
//!     client.submit_job(&context).await?;
//! }
//! client.on_terminal(|event| println!("finished: {:?}", event.outcome));
//! # Ok(())
//! # }
//! ```
#![allow(missing_docs)]

pub mod config;
pub mod error;
pub mod infra;
pub mod jobs;

pub use config::{ClientConfig, ConfigError};
pub use error::{ErrorKind, JobClientError, Result};
pub use infra::{
    ApiClient, FileHandleSlot, HandleSlot, MemoryHandleSlot, ScanTransport,
    SystemTimeProvider, TimeProvider, TransportError,
};
pub use jobs::{
    CredentialArtifact, JobClient, JobClientBuilder, JobContext, JobOutcome,
    ProgressSnapshot, Submission, SuspendReason, TerminalEvent, TrackingPhase,
    TrackingState,
};
