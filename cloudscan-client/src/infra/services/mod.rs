pub mod transport;

pub use transport::{
    AwsScanRequest, GcpScanRequest, KeyUpload, ScanTransport, TransportError,
    TransportResult,
};
