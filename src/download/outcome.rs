//! Terminal result of one download task.

use std::path::PathBuf;

use super::error::DownloadError;

/// How a download task ended.
///
/// Produced exactly once per task. Failures never escape a task as errors;
/// they are reported here instead.
#[derive(Debug)]
pub enum TransferOutcome {
    /// The body was fully written to `path`.
    Success {
        /// Destination file.
        path: PathBuf,
        /// Bytes written.
        bytes_written: u64,
    },
    /// The body was fully written, but the server never announced a length.
    NoContentLength {
        /// Destination file.
        path: PathBuf,
        /// Bytes written.
        bytes_written: u64,
    },
    /// The final response had a status outside `200..300`; no body was read.
    StatusError {
        /// Final status code.
        status: u16,
    },
    /// `Content-Length` was present but not a non-negative integer.
    InvalidContentLength {
        /// The raw header value.
        value: String,
    },
    /// Transport, local I/O or prompt failure.
    Failed(DownloadError),
    /// Stopped by group-wide cancellation.
    Cancelled,
}

impl TransferOutcome {
    /// True when the body was written to disk.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::NoContentLength { .. })
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Destination file, for outcomes that produced one.
    #[must_use]
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Success { path, .. } | Self::NoContentLength { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Bytes persisted, zero for outcomes that wrote nothing.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        match self {
            Self::Success { bytes_written, .. } | Self::NoContentLength { bytes_written, .. } => {
                *bytes_written
            }
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_variants_report_path_and_bytes() {
        let outcome = TransferOutcome::NoContentLength {
            path: PathBuf::from("/out/x.bin"),
            bytes_written: 42,
        };
        assert!(outcome.is_success());
        assert_eq!(outcome.bytes_written(), 42);
        assert_eq!(outcome.path(), Some(&PathBuf::from("/out/x.bin")));
    }

    #[test]
    fn test_failure_variants_write_nothing() {
        for outcome in [
            TransferOutcome::StatusError { status: 404 },
            TransferOutcome::InvalidContentLength {
                value: "abc".into(),
            },
            TransferOutcome::Failed(DownloadError::timeout("https://example.com")),
            TransferOutcome::Cancelled,
        ] {
            assert!(!outcome.is_success());
            assert_eq!(outcome.bytes_written(), 0);
            assert!(outcome.path().is_none());
        }
    }
}
