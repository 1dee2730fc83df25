//! Batch ingestion: sources, transports, pacing and the controller that ties
//! them to the upload session.

mod controller;
pub mod pacing;
mod source;
mod transport;
mod types;

pub use controller::{CleanupHook, IngestController};
pub use source::{DirectorySource, FileSource, MemorySource};
pub use transport::{CompressedFile, DirectoryTransport, RetryingTransport, UploadReceipt, UploadTransport};
pub use types::{
    CompressionReport, FailedItem, IngestPhase, IngestSummary, ItemReport, UploadReport,
};
