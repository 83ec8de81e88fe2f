//! Exit code logic for the downloader process.
//!
//! Single responsibility: map a finished batch to the process exit outcome.
//! Individual download failures are reported in the log, not in the exit code.

use cdownloader_core::BatchReport;

use crate::ProcessExit;

/// Determines the process exit outcome for a finished batch.
pub(crate) fn determine_exit_outcome(report: &BatchReport) -> ProcessExit {
    if report.interrupted {
        ProcessExit::Interrupted
    } else if report.faulted {
        ProcessExit::Failure
    } else {
        ProcessExit::Success
    }
}
