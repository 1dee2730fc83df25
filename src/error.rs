use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("an upload session is already active")]
    SessionActive,
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Failure reported by an [`UploadTransport`](crate::ingest::UploadTransport) for one item.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("upload attempt timed out after {0:?}")]
    Timeout(Duration),
    #[error("upload rejected: {0}")]
    Rejected(String),
}

impl TransportError {
    /// Rejections are terminal; everything else is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Rejected(_))
    }
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;
