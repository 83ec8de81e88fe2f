//! One URL's download lifecycle.
//!
//! A task walks `Probing -> Authenticating (optional) -> HeadersReceived ->
//! Transferring` and ends in `Completed`, `Cancelled` or `Failed`. Every
//! failure is caught here and reported as a [`TransferOutcome`]; nothing a
//! task does can abort its siblings.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderMap};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use super::auth::{CredentialPrompt, Credentials, requires_auth};
use super::client::{FetchedResponse, HttpClient};
use super::constants::DEFAULT_CHUNK_SIZE;
use super::error::DownloadError;
use super::filename::{PathClaims, resolve_destination};
use super::outcome::TransferOutcome;
use super::sink::Sink;
use crate::progress::{ProgressRegistry, ProgressUpdate, TaskId};

/// What to download and where to put it.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    /// URL as supplied by the caller.
    pub url: String,
    /// Explicit destination; derived from the final URL when absent.
    pub file_path: Option<PathBuf>,
    /// Directory relative destinations are resolved against.
    pub directory: PathBuf,
    /// Credentials supplied up front, shared by every task of a run.
    pub credentials: Option<Arc<Credentials>>,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            file_path: None,
            directory: directory.into(),
            credentials: None,
        }
    }

    #[must_use]
    pub fn with_file_path(mut self, file_path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(file_path.into());
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Arc<Credentials>) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

/// Per-run task behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskOptions {
    /// Hold bodies in memory and write each file once at the end.
    pub buffered: bool,
    /// Size of the slices the body stream is cut into.
    pub chunk_size: usize,
    /// Send a HEAD request before the GET authentication probe.
    pub probe_with_head: bool,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            buffered: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            probe_with_head: true,
        }
    }
}

/// Collaborators shared by every task of a run.
pub struct TaskContext {
    pub client: HttpClient,
    pub registry: Arc<ProgressRegistry>,
    pub prompt: Arc<dyn CredentialPrompt>,
    pub claims: PathClaims,
    /// Held for the duration of an interactive prompt; one at a time.
    pub prompt_lock: Mutex<()>,
    pub options: TaskOptions,
}

impl TaskContext {
    #[must_use]
    pub fn new(
        client: HttpClient,
        registry: Arc<ProgressRegistry>,
        prompt: Arc<dyn CredentialPrompt>,
        options: TaskOptions,
    ) -> Self {
        Self {
            client,
            registry,
            prompt,
            claims: PathClaims::new(),
            prompt_lock: Mutex::new(()),
            options,
        }
    }
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("client", &self.client)
            .field("claims", &self.claims)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Lifecycle state of a download task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Probing,
    Authenticating,
    HeadersReceived,
    Transferring,
    Completed,
    Cancelled,
    Failed,
}

/// Why a task stopped early.
enum Stop {
    Cancelled,
    Failed(DownloadError),
}

impl From<DownloadError> for Stop {
    fn from(error: DownloadError) -> Self {
        Self::Failed(error)
    }
}

/// Runs one download to completion, cancellation or failure.
///
/// Never panics on network or disk errors and never returns an error: the
/// result is always one of the [`TransferOutcome`] variants.
#[instrument(skip_all, fields(url = %request.url))]
pub async fn run_download(
    ctx: Arc<TaskContext>,
    request: DownloadRequest,
    cancel: CancellationToken,
) -> TransferOutcome {
    let mut task = DownloadTask {
        ctx,
        request,
        cancel,
        id: None,
        state: TaskState::Probing,
        destination: None,
        sink: None,
    };

    match task.execute().await {
        Ok(outcome) => {
            task.transition(if outcome.is_success() {
                TaskState::Completed
            } else {
                TaskState::Failed
            });
            outcome
        }
        Err(Stop::Cancelled) => task.cancelled().await,
        Err(Stop::Failed(error)) => task.failed(error).await,
    }
}

struct DownloadTask {
    ctx: Arc<TaskContext>,
    request: DownloadRequest,
    cancel: CancellationToken,
    id: Option<TaskId>,
    state: TaskState,
    destination: Option<PathBuf>,
    sink: Option<Sink>,
}

impl DownloadTask {
    fn transition(&mut self, next: TaskState) {
        debug!(from = ?self.state, to = ?next, "task state changed");
        self.state = next;
    }

    /// Awaits `future` unless the run is cancelled first.
    async fn guarded<F: Future>(&self, future: F) -> Result<F::Output, Stop> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Stop::Cancelled),
            output = future => Ok(output),
        }
    }

    fn update(&self, update: ProgressUpdate) {
        if let Some(id) = self.id {
            self.ctx.registry.update(id, update);
        }
    }

    async fn execute(&mut self) -> Result<TransferOutcome, Stop> {
        let raw = self.request.url.trim().to_string();
        let parsed = Url::parse(&raw)
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some());
        let host = parsed
            .as_ref()
            .and_then(Url::host_str)
            .map_or_else(|| raw.clone(), ToString::to_string);

        self.id = Some(
            self.ctx
                .registry
                .add(format!("Check authentication status of {host}"), true),
        );
        let url = parsed.ok_or_else(|| DownloadError::invalid_url(raw.as_str()))?;

        let credentials = self.negotiate_auth(&url, &host).await?;

        let fetched = self
            .guarded(self.ctx.client.get(&url, credentials.as_deref()))
            .await??;
        self.transition(TaskState::HeadersReceived);
        if let Some(id) = self.id {
            self.ctx.registry.start(id);
        }

        let status = fetched.status();
        if !status.is_success() {
            self.update(
                ProgressUpdate::new()
                    .total(1)
                    .completed(1)
                    .pulsing(false)
                    .description(format!("Get {host} - status {}", status.as_u16())),
            );
            warn!(%url, status = status.as_u16(), "server answered with an error status");
            return Ok(TransferOutcome::StatusError {
                status: status.as_u16(),
            });
        }

        for hop in fetched.redirects() {
            info!(from = %hop.from, to = %hop.to, status = hop.status, "redirected");
        }
        let label = host_chain(&url, &fetched);

        let content_type = fetched
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok());
        let destination = self.ctx.claims.claim(resolve_destination(
            self.request.file_path.as_deref(),
            &self.request.directory,
            fetched.url(),
            content_type,
        ));
        info!(url_path = fetched.url().path(), path = %destination.display(), "saving download");
        self.destination = Some(destination.clone());

        let length = match content_length(fetched.headers()) {
            Ok(None) => {
                warn!(
                    url_path = fetched.url().path(),
                    "no content length returned; download time is unknown and ETA will be unavailable"
                );
                None
            }
            Ok(Some(length)) => Some(length),
            Err(value) => {
                self.update(
                    ProgressUpdate::new()
                        .total(1)
                        .completed(1)
                        .pulsing(false)
                        .description(format!("Get {label} - failed!")),
                );
                warn!(%url, content_length = %value, "unparsable Content-Length");
                return Ok(TransferOutcome::InvalidContentLength { value });
            }
        };

        self.transfer(fetched, &destination, &label, length).await
    }

    /// Runs the authentication probe and obtains credentials when needed.
    async fn negotiate_auth(
        &mut self,
        url: &Url,
        host: &str,
    ) -> Result<Option<Arc<Credentials>>, Stop> {
        let probe = requires_auth(&self.ctx.client, url, self.ctx.options.probe_with_head);
        let required = self.guarded(probe).await??;

        if !required {
            info!(host, "does not require authentication");
            return Ok(None);
        }

        if let Some(credentials) = &self.request.credentials {
            info!(host, "requires authentication; sending basic auth");
            return Ok(Some(Arc::clone(credentials)));
        }

        self.transition(TaskState::Authenticating);
        let ctx = Arc::clone(&self.ctx);
        let _turn = self.guarded(ctx.prompt_lock.lock()).await?;

        ctx.registry.stop_rendering();
        info!(host, "requires authentication; please input a username and password");
        let answer = self.guarded(ctx.prompt.prompt(host)).await;
        // An interrupt during the prompt leaves the display to the orchestrator.
        if !self.cancel.is_cancelled() {
            ctx.registry.start_rendering();
        }

        let credentials = answer??;
        info!(host, "sending basic auth");
        Ok(Some(Arc::new(credentials)))
    }

    async fn transfer(
        &mut self,
        fetched: FetchedResponse,
        destination: &Path,
        label: &str,
        length: Option<u64>,
    ) -> Result<TransferOutcome, Stop> {
        self.transition(TaskState::Transferring);
        let name = display_name(destination);
        let description = format!("Get {label} ('{name}')");
        self.update(
            ProgressUpdate::new()
                .description(description)
                .total(length.unwrap_or(0))
                .completed(0)
                .pulsing(length.is_none()),
        );

        let url = fetched.url().to_string();
        self.sink = Some(Sink::open(destination, self.ctx.options.buffered).await?);

        let chunk_size = self.ctx.options.chunk_size.max(1);
        let mut stream = fetched.into_response().bytes_stream();
        let mut received: u64 = 0;
        let mut total = length.unwrap_or(0);

        while let Some(next) = self.guarded(stream.next()).await? {
            let bytes = next.map_err(|e| DownloadError::network(url.as_str(), e))?;
            for piece in bytes.chunks(chunk_size) {
                if self.cancel.is_cancelled() {
                    return Err(Stop::Cancelled);
                }
                if let Some(sink) = self.sink.as_mut() {
                    sink.write(piece).await?;
                }
                received += piece.len() as u64;
                total = raised_total(total, received);
                self.update(ProgressUpdate::new().completed(received).total(total));
            }
        }

        if let Some(sink) = self.sink.take() {
            sink.commit().await?;
        }
        self.update(
            ProgressUpdate::new()
                .completed(received)
                .total(total)
                .pulsing(false),
        );
        info!(path = %destination.display(), bytes = received, "download complete");

        let path = destination.to_path_buf();
        Ok(match length {
            Some(_) => TransferOutcome::Success {
                path,
                bytes_written: received,
            },
            None => TransferOutcome::NoContentLength {
                path,
                bytes_written: received,
            },
        })
    }

    async fn cancelled(&mut self) -> TransferOutcome {
        self.transition(TaskState::Cancelled);
        if let Some(id) = self.id {
            self.ctx.registry.mark_cancelled(id);
        }
        info!(file = %self.file_label(), "cancelling download");
        if let Some(sink) = self.sink.take() {
            sink.abandon().await;
        }
        TransferOutcome::Cancelled
    }

    async fn failed(&mut self, error: DownloadError) -> TransferOutcome {
        self.transition(TaskState::Failed);
        if let Some(id) = self.id {
            self.ctx.registry.remove(id);
        }
        error!(file = %self.file_label(), error = %error, "fatal error downloading");
        if let Some(sink) = self.sink.take() {
            sink.abandon().await;
        }
        TransferOutcome::Failed(error)
    }

    /// File name for log lines, or a random placeholder when no destination
    /// was resolved yet.
    fn file_label(&self) -> String {
        self.destination
            .as_deref()
            .map_or_else(placeholder_name, display_name)
    }
}

/// Declared body length. `Err` carries the header text when it is not a
/// byte count.
fn content_length(headers: &HeaderMap) -> Result<Option<u64>, String> {
    let Some(value) = headers.get(CONTENT_LENGTH) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Some)
        .ok_or_else(|| String::from_utf8_lossy(value.as_bytes()).into_owned())
}

/// Total after `received` bytes: never below what actually arrived.
fn raised_total(total: u64, received: u64) -> u64 {
    total.max(received)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

/// Twelve random hex characters.
fn placeholder_name() -> String {
    let bytes: [u8; 6] = rand::random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Distinct hosts visited, oldest first, joined by `>`.
fn host_chain(requested: &Url, fetched: &FetchedResponse) -> String {
    let mut hosts: Vec<&str> = Vec::new();
    let visited = std::iter::once(requested)
        .chain(fetched.redirects().iter().map(|hop| &hop.to))
        .chain(std::iter::once(fetched.url()));
    for url in visited {
        if let Some(host) = url.host_str()
            && !hosts.contains(&host)
        {
            hosts.push(host);
        }
    }
    hosts.join(">")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use crate::download::ClientOptions;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    struct FixedPrompt {
        calls: AtomicUsize,
        answer: Option<(&'static str, &'static str)>,
    }

    #[async_trait]
    impl CredentialPrompt for FixedPrompt {
        async fn prompt(&self, host: &str) -> Result<Credentials, DownloadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer
                .map(|(u, p)| Credentials::new(u, p))
                .ok_or_else(|| DownloadError::prompt(host, "aborted"))
        }
    }

    fn context(prompt: Arc<FixedPrompt>, options: TaskOptions) -> Arc<TaskContext> {
        Arc::new(TaskContext::new(
            HttpClient::new(ClientOptions::default()).unwrap(),
            Arc::new(ProgressRegistry::hidden()),
            prompt,
            options,
        ))
    }

    fn no_prompt() -> Arc<FixedPrompt> {
        Arc::new(FixedPrompt {
            calls: AtomicUsize::new(0),
            answer: None,
        })
    }

    #[test]
    fn test_placeholder_name_is_twelve_hex_chars() {
        let name = placeholder_name();
        assert_eq!(name.len(), 12);
        assert!(name.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_content_length_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(content_length(&headers), Ok(None));

        headers.insert(CONTENT_LENGTH, "1000".parse().unwrap());
        assert_eq!(content_length(&headers), Ok(Some(1000)));

        headers.insert(CONTENT_LENGTH, "ten bytes".parse().unwrap());
        assert_eq!(content_length(&headers), Err("ten bytes".to_string()));

        headers.insert(CONTENT_LENGTH, "-5".parse().unwrap());
        assert_eq!(content_length(&headers), Err("-5".to_string()));
    }

    #[test]
    fn test_total_is_raised_to_received_bytes() {
        // Declared total undercounts the body.
        assert_eq!(raised_total(100, 40), 100);
        assert_eq!(raised_total(100, 160), 160);
        // Unknown total follows the bytes received.
        assert_eq!(raised_total(0, 0), 0);
        assert_eq!(raised_total(0, 256), 256);
    }

    #[test]
    fn test_task_options_default() {
        let options = TaskOptions::default();
        assert!(!options.buffered);
        assert!(options.probe_with_head);
        assert_eq!(options.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[tokio::test]
    async fn test_invalid_url_fails_and_removes_entry() {
        let dir = TempDir::new().unwrap();
        let ctx = context(no_prompt(), TaskOptions::default());
        let outcome = run_download(
            Arc::clone(&ctx),
            DownloadRequest::new("not a url", dir.path()),
            CancellationToken::new(),
        )
        .await;

        assert!(matches!(
            outcome,
            TransferOutcome::Failed(DownloadError::InvalidUrl { .. })
        ));
        assert!(ctx.registry.entries().is_empty());
    }

    #[tokio::test]
    async fn test_already_cancelled_task_marks_entry() {
        let dir = TempDir::new().unwrap();
        let ctx = context(no_prompt(), TaskOptions::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = run_download(
            Arc::clone(&ctx),
            DownloadRequest::new("http://127.0.0.1:9/never.bin", dir.path()),
            cancel,
        )
        .await;

        assert!(outcome.is_cancelled());
        let entries = ctx.registry.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].description,
            "Check authentication status of 127.0.0.1 (cancelled)"
        );
    }

    #[tokio::test]
    async fn test_prompt_used_when_challenged_without_credentials() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("HEAD"))
            .and(path("/private.txt"))
            .respond_with(
                ResponseTemplate::new(401).insert_header("WWW-Authenticate", "Basic realm=\"x\""),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/private.txt"))
            .and(wiremock::matchers::basic_auth("alice", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"classified".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let prompt = Arc::new(FixedPrompt {
            calls: AtomicUsize::new(0),
            answer: Some(("alice", "secret")),
        });
        let ctx = context(Arc::clone(&prompt), TaskOptions::default());
        let outcome = run_download(
            ctx,
            DownloadRequest::new(format!("{}/private.txt", server.uri()), dir.path()),
            CancellationToken::new(),
        )
        .await;

        assert!(outcome.is_success(), "unexpected outcome {outcome:?}");
        assert_eq!(prompt.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            std::fs::read(dir.path().join("private.txt")).unwrap(),
            b"classified"
        );
    }

    #[tokio::test]
    async fn test_aborted_prompt_fails_task() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("HEAD"))
            .respond_with(
                ResponseTemplate::new(401).insert_header("WWW-Authenticate", "Basic realm=\"x\""),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let prompt = no_prompt();
        let ctx = context(Arc::clone(&prompt), TaskOptions::default());
        let outcome = run_download(
            Arc::clone(&ctx),
            DownloadRequest::new(format!("{}/locked.bin", server.uri()), dir.path()),
            CancellationToken::new(),
        )
        .await;

        assert!(matches!(
            outcome,
            TransferOutcome::Failed(DownloadError::Prompt { .. })
        ));
        assert_eq!(prompt.calls.load(Ordering::SeqCst), 1);
        assert!(ctx.registry.entries().is_empty());
    }

    #[tokio::test]
    async fn test_host_chain_lists_distinct_hosts_oldest_first() {
        let Some(first) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/start"))
            .respond_with(ResponseTemplate::new(302).insert_header(
                "Location",
                format!("{}/end.bin", first.uri().replace("127.0.0.1", "localhost")),
            ))
            .mount(&first)
            .await;
        Mock::given(method("GET"))
            .and(path("/end.bin"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&first)
            .await;

        let client = HttpClient::new(ClientOptions::default()).unwrap();
        let url = Url::parse(&format!("{}/start", first.uri())).unwrap();
        let fetched = client.get(&url, None).await.unwrap();
        assert_eq!(host_chain(&url, &fetched), "127.0.0.1>localhost");
    }
}
