//! CLI entry point for the concurrent downloader.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

mod app;
mod cli;

use cli::Args;

/// How long blocking helpers (an abandoned credential prompt) may hold up
/// runtime shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

/// Process exit status for a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    Success,
    Failure,
    Interrupted,
}

impl ProcessExit {
    pub(crate) fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Interrupted => 130,
        }
    }
}

fn main() -> ExitCode {
    // Parse before tracing so --help and usage errors print without logs
    let args = Args::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("Error: failed to start async runtime: {error}");
            return ExitCode::from(ProcessExit::Failure.code());
        }
    };

    let result = runtime.block_on(app::runtime::run_cdl(args));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);

    match result {
        Ok(exit) => ExitCode::from(exit.code()),
        Err(error) => match error.downcast::<clap::Error>() {
            Ok(usage) => usage.exit(),
            Err(error) => {
                eprintln!("Error: {error:#}");
                ExitCode::from(ProcessExit::Failure.code())
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::ProcessExit;

    #[test]
    fn test_process_exit_codes() {
        assert_eq!(ProcessExit::Success.code(), 0);
        assert_eq!(ProcessExit::Failure.code(), 1);
        assert_eq!(ProcessExit::Interrupted.code(), 130);
    }
}
