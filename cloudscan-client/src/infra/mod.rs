//! Infrastructure shared by the job client
//!
//! HTTP transport to the scan worker, durable handle storage and the time
//! abstraction the poller runs on.

pub mod api_client;
pub mod services;
pub mod storage;
pub mod testing;
pub mod time;

pub use api_client::ApiClient;
pub use services::{ScanTransport, TransportError, TransportResult};
pub use storage::{FileHandleSlot, HandleSlot, HandleStoreError, MemoryHandleSlot};
pub use time::{SystemTimeProvider, TimeProvider};
