//! Error taxonomy for the capture pipeline.
//!
//! Device errors are always recovered inside the producers (stub substitution
//! or partial data). Aggregation and publish errors are the only conditions
//! that reach the operator as a failed run.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by device interfaces and producer adapters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// No instance of the device class was found.
    #[error("device unavailable: {0}")]
    Unavailable(String),

    /// The device call did not return within its grace window.
    #[error("device timed out after {0:?}")]
    Timeout(Duration),

    /// Intermittent failure on an otherwise open device or stream.
    #[error("read failure: {0}")]
    ReadFailure(String),
}

impl DeviceError {
    /// Short machine-friendly kind used in metadata.
    pub fn kind(&self) -> &'static str {
        match self {
            DeviceError::Unavailable(_) => "device_unavailable",
            DeviceError::Timeout(_) => "device_timeout",
            DeviceError::ReadFailure(_) => "read_failure",
        }
    }
}

/// The report bundle could not be built or written.
#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("failed to encode {artifact}: {reason}")]
    Encode {
        artifact: &'static str,
        reason: String,
    },

    #[error("failed to serialize metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The archive or hand-off step failed. Never retried automatically.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("archive is {size} bytes, transport limit is {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    #[error("transport '{0}' is not secure and insecure publishing is disabled")]
    InsecureTransport(String),

    #[error("failed to write manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// Fatal outcome of a full collection-and-publish cycle.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("aggregation failed: {0}")]
    Aggregation(#[from] AggregationError),

    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_kinds() {
        assert_eq!(
            DeviceError::Unavailable("camera".into()).kind(),
            "device_unavailable"
        );
        assert_eq!(
            DeviceError::Timeout(Duration::from_secs(3)).kind(),
            "device_timeout"
        );
        assert_eq!(DeviceError::ReadFailure("x".into()).kind(), "read_failure");
    }

    #[test]
    fn test_run_error_wraps_publish() {
        let err: RunError = PublishError::TooLarge { size: 10, limit: 5 }.into();
        assert!(err.to_string().contains("limit is 5 bytes"));
    }
}
