//! Core data model definitions shared across CloudScan crates.
#![allow(missing_docs)]

pub mod error;
pub mod ids;
pub mod job;
pub mod provider;
pub mod scan;
pub mod status;

// Intentionally curated re-exports for downstream consumers.
pub use error::{ModelError, Result as ModelResult};
pub use ids::JobId;
pub use job::ScanJob;
pub use provider::ProviderKind;
pub use scan::{
    AsyncScanAccepted, DiscoveryResponse, ErrorBody, HistoryResponse,
    JobSummary, StatusResponse, SyncScanResponse,
};
pub use status::JobStatus;
