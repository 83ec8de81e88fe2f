//! Available-memory watchdog for buffered downloads.
//!
//! Buffered mode keeps whole response bodies in RAM, so while it is active a
//! background task polls available memory and warns once when it drops
//! below a threshold, then once more when it recovers.

use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use sysinfo::System;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default polling interval.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

const GIB: u64 = 1024 * 1024 * 1024;
const MIB: u64 = 1024 * 1024;

/// A change in the low-memory condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryEvent {
    /// Available memory fell below the threshold.
    Warning {
        /// Bytes available when the warning fired.
        available: u64,
    },
    /// Available memory is back above the threshold.
    Resolved,
}

/// Source of the current available-memory figure.
///
/// Implementations may block; the watchdog calls them from a blocking thread.
pub trait MemorySource: Send + Sync + 'static {
    /// Bytes of memory currently available to new allocations.
    ///
    /// # Errors
    ///
    /// Returns an error if the figure cannot be read on this platform.
    fn available_bytes(&self) -> io::Result<u64>;
}

/// Available memory as reported by the operating system.
#[derive(Debug)]
pub struct SystemMemory {
    system: Mutex<System>,
}

impl Default for SystemMemory {
    fn default() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl MemorySource for SystemMemory {
    fn available_bytes(&self) -> io::Result<u64> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "memory statistics are not available on this platform",
            ));
        }
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_memory();
        Ok(system.available_memory())
    }
}

/// Low-memory detector with its own warning state.
#[derive(Debug, Clone)]
pub struct MemoryWatchdog {
    threshold: u64,
    interval: Duration,
    warning_displayed: bool,
}

impl MemoryWatchdog {
    /// Watchdog warning below `threshold` bytes.
    #[must_use]
    pub fn new(threshold: u64) -> Self {
        Self {
            threshold,
            interval: POLL_INTERVAL,
            warning_displayed: false,
        }
    }

    /// Watchdog warning below `gib` GiB.
    #[must_use]
    pub fn from_gib(gib: u64) -> Self {
        Self::new(gib.saturating_mul(GIB))
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn warning_displayed(&self) -> bool {
        self.warning_displayed
    }

    /// Feeds one reading; returns an event only when the condition changes.
    pub fn observe(&mut self, available: u64) -> Option<MemoryEvent> {
        let low = available < self.threshold;
        match (low, self.warning_displayed) {
            (true, false) => {
                self.warning_displayed = true;
                Some(MemoryEvent::Warning { available })
            }
            (false, true) => {
                self.warning_displayed = false;
                Some(MemoryEvent::Resolved)
            }
            _ => None,
        }
    }

    /// Polls `source` until `cancel` fires or the source fails.
    ///
    /// Returns the watchdog so its final state can be inspected.
    pub async fn run<S: MemorySource + ?Sized>(
        mut self,
        source: Arc<S>,
        cancel: CancellationToken,
    ) -> Self {
        debug!(
            threshold_mib = self.threshold / MIB,
            interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            "memory watchdog started"
        );

        while !cancel.is_cancelled() {
            let reader = Arc::clone(&source);
            let probe = tokio::task::spawn_blocking(move || reader.available_bytes());
            let reading = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                joined = probe => joined,
            };

            match reading {
                Ok(Ok(available)) => match self.observe(available) {
                    Some(MemoryEvent::Warning { available }) => warn!(
                        available_mib = available / MIB,
                        threshold_mib = self.threshold / MIB,
                        "available memory is low; buffered downloads may run out of memory"
                    ),
                    Some(MemoryEvent::Resolved) => info!(
                        available_mib = available / MIB,
                        "available memory recovered"
                    ),
                    None => {}
                },
                Ok(Err(error)) => {
                    warn!(%error, "cannot read available memory; memory watchdog disabled");
                    break;
                }
                Err(error) => {
                    warn!(%error, "memory probe task failed; memory watchdog disabled");
                    break;
                }
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }
        }

        debug!("memory watchdog stopped");
        self
    }

    /// Runs the watchdog as a background task.
    pub fn spawn<S: MemorySource + ?Sized>(
        self,
        source: Arc<S>,
        cancel: CancellationToken,
    ) -> JoinHandle<Self> {
        tokio::spawn(self.run(source, cancel))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedSource {
        readings: Mutex<Vec<u64>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(mut readings: Vec<u64>) -> Self {
            readings.reverse();
            Self {
                readings: Mutex::new(readings),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl MemorySource for ScriptedSource {
        fn available_bytes(&self) -> io::Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut readings = self.readings.lock().unwrap();
            match readings.len() {
                0 => Err(io::Error::other("script exhausted")),
                1 => Ok(readings[0]),
                _ => Ok(readings.pop().unwrap()),
            }
        }
    }

    struct BrokenSource;

    impl MemorySource for BrokenSource {
        fn available_bytes(&self) -> io::Result<u64> {
            Err(io::Error::new(io::ErrorKind::Unsupported, "no meminfo"))
        }
    }

    #[test]
    fn test_observe_warns_once_then_resolves_once() {
        let mut watchdog = MemoryWatchdog::from_gib(1);
        assert_eq!(watchdog.observe(2 * GIB), None);
        assert_eq!(
            watchdog.observe(GIB / 2),
            Some(MemoryEvent::Warning { available: GIB / 2 })
        );
        assert_eq!(watchdog.observe(GIB / 4), None);
        assert!(watchdog.warning_displayed());
        assert_eq!(watchdog.observe(3 * GIB), Some(MemoryEvent::Resolved));
        assert_eq!(watchdog.observe(3 * GIB), None);
        assert!(!watchdog.warning_displayed());
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mut watchdog = MemoryWatchdog::new(1000);
        assert_eq!(watchdog.observe(1000), None);
        assert!(watchdog.observe(999).is_some());
    }

    #[test]
    fn test_system_memory_reports_a_figure() {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return;
        }
        let source = SystemMemory::default();
        assert!(source.available_bytes().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel_and_keeps_state() {
        let source = Arc::new(ScriptedSource::new(vec![GIB / 2]));
        let cancel = CancellationToken::new();
        let handle = MemoryWatchdog::from_gib(1)
            .with_interval(Duration::from_millis(10))
            .spawn(Arc::clone(&source), cancel.clone());

        tokio::time::sleep(Duration::from_millis(60)).await;
        cancel.cancel();
        let watchdog = handle.await.unwrap();

        assert!(watchdog.warning_displayed());
        assert!(source.calls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_run_stops_when_source_fails() {
        let cancel = CancellationToken::new();
        let watchdog = MemoryWatchdog::from_gib(1)
            .with_interval(Duration::from_millis(10))
            .run(Arc::new(BrokenSource), cancel.clone())
            .await;
        assert!(!watchdog.warning_displayed());
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_run_exits_immediately_when_already_cancelled() {
        let source = Arc::new(ScriptedSource::new(vec![GIB / 2]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let watchdog = MemoryWatchdog::from_gib(1).run(Arc::clone(&source), cancel).await;
        assert!(!watchdog.warning_displayed());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }
}
