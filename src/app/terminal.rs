//! Terminal detection and tracing set-up.
//!
//! Log lines are written through [`MultiProgress::suspend`] so they appear
//! above the live progress display instead of tearing it.

use std::io::{self, Write};

use indicatif::MultiProgress;
use tracing_subscriber::fmt::MakeWriter;

/// Width assumed when stderr is not a terminal.
const FALLBACK_WIDTH: usize = 60;

pub(crate) fn no_color_env_requested() -> bool {
    std::env::var_os("NO_COLOR").is_some_and(|value| !value.is_empty())
}

pub(crate) fn is_dumb_terminal() -> bool {
    std::env::var("TERM")
        .map(|value| value.eq_ignore_ascii_case("dumb"))
        .unwrap_or(false)
}

pub(crate) fn should_use_live_progress(
    stderr_is_terminal: bool,
    quiet: bool,
    dumb_terminal: bool,
) -> bool {
    stderr_is_terminal && !quiet && !dumb_terminal
}

/// Columns available on stderr.
pub(crate) fn terminal_width() -> usize {
    let term = console::Term::stderr();
    if term.is_term() {
        usize::from(term.size().1)
    } else {
        FALLBACK_WIDTH
    }
}

/// Log level implied by `-q`/`-v` when `RUST_LOG` is not set.
pub(crate) fn default_level(quiet: bool, verbose: u8) -> &'static str {
    if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

pub(crate) fn init_tracing(default_level: &str, no_color: bool, progress: &MultiProgress) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_writer(ProgressAwareWriter::new(progress.clone()))
        .with_ansi(!no_color)
        .with_target(false)
        .with_env_filter(filter)
        .try_init();
}

/// [`MakeWriter`] printing each formatted event above the progress bars.
#[derive(Clone)]
pub(crate) struct ProgressAwareWriter {
    multi: MultiProgress,
}

impl ProgressAwareWriter {
    pub(crate) fn new(multi: MultiProgress) -> Self {
        Self { multi }
    }
}

impl<'a> MakeWriter<'a> for ProgressAwareWriter {
    type Writer = SuspendedLine;

    fn make_writer(&'a self) -> Self::Writer {
        SuspendedLine {
            multi: self.multi.clone(),
            buffer: Vec::new(),
        }
    }
}

/// Collects one event and emits it on drop with the bars suspended.
pub(crate) struct SuspendedLine {
    multi: MultiProgress,
    buffer: Vec<u8>,
}

impl Write for SuspendedLine {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for SuspendedLine {
    fn drop(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let buffer = std::mem::take(&mut self.buffer);
        self.multi.suspend(|| {
            let mut stderr = io::stderr().lock();
            let _ = stderr.write_all(&buffer);
            let _ = stderr.flush();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indicatif::ProgressDrawTarget;

    #[test]
    fn test_live_progress_requires_interactive_terminal() {
        assert!(should_use_live_progress(true, false, false));
        assert!(!should_use_live_progress(false, false, false));
        assert!(!should_use_live_progress(true, true, false));
        assert!(!should_use_live_progress(true, false, true));
    }

    #[test]
    fn test_default_level_from_flags() {
        assert_eq!(default_level(true, 0), "error");
        assert_eq!(default_level(false, 0), "info");
        assert_eq!(default_level(false, 1), "debug");
        assert_eq!(default_level(false, 5), "trace");
    }

    #[test]
    fn test_suspended_line_buffers_until_drop() {
        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        let writer = ProgressAwareWriter::new(multi);
        let mut line = writer.make_writer();
        line.write_all(b"hello ").unwrap();
        line.write_all(b"world\n").unwrap();
        assert_eq!(line.buffer, b"hello world\n");
        drop(line);
    }
}
