//! Download orchestrator: one task per URL, supervised as a group.
//!
//! The engine deduplicates the requests, starts one [`run_download`] task per
//! distinct URL in a [`JoinSet`] and waits for all of them. An interrupt, or a
//! task panicking, takes the group-wide cancellation path:
//!
//! 1. every progress entry that is not complete is marked cancelled
//! 2. live rendering stops
//! 3. every task's cancellation token fires
//! 4. the engine waits for every task to observe it and exit
//!
//! In buffered mode a [`MemoryWatchdog`] runs alongside the tasks and is
//! stopped and awaited however the run ends.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::auth::CredentialPrompt;
use super::client::HttpClient;
use super::outcome::TransferOutcome;
use super::task::{DownloadRequest, TaskContext, TaskOptions, run_download};
use crate::memory::{MemorySource, MemoryWatchdog};
use crate::progress::ProgressRegistry;

/// Result of one batch run, used for logging and the exit code.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// `(url, outcome)` per finished task, in completion order.
    pub outcomes: Vec<(String, TransferOutcome)>,
    /// The run was interrupted by the operator.
    pub interrupted: bool,
    /// A task panicked and the batch was cancelled because of it.
    pub faulted: bool,
}

impl BatchReport {
    /// Number of tasks that wrote their file.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_success()).count()
    }

    #[must_use]
    pub fn cancelled(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_cancelled()).count()
    }

    /// Number of tasks that ended in any failure state.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded() - self.cancelled()
    }
}

/// Trims URLs, drops empty ones and keeps only the first request per URL.
///
/// Each request keeps the file name it was paired with, so a dropped
/// duplicate also drops its name.
#[must_use]
pub fn dedupe_requests(requests: Vec<DownloadRequest>) -> Vec<DownloadRequest> {
    let mut seen = HashSet::new();
    requests
        .into_iter()
        .filter_map(|mut request| {
            let trimmed = request.url.trim();
            if trimmed.is_empty() {
                return None;
            }
            if trimmed.len() != request.url.len() {
                request.url = trimmed.to_string();
            }
            if seen.insert(request.url.clone()) {
                Some(request)
            } else {
                info!(url = %request.url, "duplicate URL - ignoring");
                None
            }
        })
        .collect()
}

/// Runs a batch of downloads concurrently.
pub struct DownloadEngine {
    ctx: Arc<TaskContext>,
    watchdog: Option<(MemoryWatchdog, Arc<dyn MemorySource>)>,
}

impl DownloadEngine {
    /// Creates an engine whose tasks share `client`, `registry` and `prompt`.
    #[must_use]
    pub fn new(
        client: HttpClient,
        registry: Arc<ProgressRegistry>,
        prompt: Arc<dyn CredentialPrompt>,
        options: TaskOptions,
    ) -> Self {
        debug!(
            buffered = options.buffered,
            chunk_size = options.chunk_size,
            probe_with_head = options.probe_with_head,
            "creating download engine"
        );
        Self {
            ctx: Arc::new(TaskContext::new(client, registry, prompt, options)),
            watchdog: None,
        }
    }

    /// Attaches a memory watchdog, started only for buffered runs.
    #[must_use]
    pub fn with_memory_watchdog(
        mut self,
        watchdog: MemoryWatchdog,
        source: Arc<dyn MemorySource>,
    ) -> Self {
        self.watchdog = Some((watchdog, source));
        self
    }

    /// Downloads every distinct request and waits for all of them.
    ///
    /// `interrupt` resolving triggers group-wide cancellation; the run
    /// still waits for every task to stop before returning.
    #[instrument(skip_all, fields(requests = requests.len()))]
    pub async fn run<I>(&self, requests: Vec<DownloadRequest>, interrupt: I) -> BatchReport
    where
        I: Future<Output = ()>,
    {
        let requests = dedupe_requests(requests);
        let group = CancellationToken::new();
        let watchdog_stop = CancellationToken::new();
        let _watchdog_guard = watchdog_stop.clone().drop_guard();

        let watchdog = match &self.watchdog {
            Some((watchdog, source)) if self.ctx.options.buffered => Some(
                watchdog
                    .clone()
                    .spawn(Arc::clone(source), watchdog_stop.clone()),
            ),
            _ => None,
        };

        info!(tasks = requests.len(), "starting downloads");
        let mut tasks = JoinSet::new();
        for request in requests {
            let ctx = Arc::clone(&self.ctx);
            let cancel = group.child_token();
            tasks.spawn(async move {
                let url = request.url.clone();
                let outcome = run_download(ctx, request, cancel).await;
                (url, outcome)
            });
        }

        let mut report = BatchReport::default();
        tokio::pin!(interrupt);

        loop {
            tokio::select! {
                biased;
                () = &mut interrupt, if !group.is_cancelled() => {
                    warn!("interrupt received; cancelling");
                    report.interrupted = true;
                    self.cancel_group(&group);
                }
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok((url, outcome))) => {
                        debug!(%url, ?outcome, "task finished");
                        report.outcomes.push((url, outcome));
                    }
                    Some(Err(join_error)) => {
                        error!(error = %join_error, "download task panicked; cancelling");
                        report.faulted = true;
                        if !group.is_cancelled() {
                            self.cancel_group(&group);
                        }
                    }
                },
            }
        }

        watchdog_stop.cancel();
        if let Some(handle) = watchdog {
            if let Err(error) = handle.await {
                warn!(%error, "memory watchdog ended abnormally");
            }
        }

        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            cancelled = report.cancelled(),
            "downloads finished"
        );
        report
    }

    fn cancel_group(&self, group: &CancellationToken) {
        let marked = self.ctx.registry.cancel_incomplete();
        self.ctx.registry.finish_rendering();
        group.cancel();
        debug!(marked, "cancellation sent to all tasks");
    }
}
