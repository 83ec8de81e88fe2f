//! HTTP client facade shared by every download task.
//!
//! This module provides the `HttpClient` struct which wraps a single
//! connection-pooled `reqwest` client with the run-wide User-Agent, timeout
//! policy and redirect policy. Redirects are followed here rather than inside
//! reqwest so that every request reports its own hop history.

use std::time::Duration;

use reqwest::header::{COOKIE, HeaderMap, HeaderValue, LOCATION};
use reqwest::{Client, Method, StatusCode, redirect};
use tracing::{debug, instrument, warn};
use url::Url;

use super::auth::Credentials;
use super::constants::{CONNECT_TIMEOUT_SECS, HEADER_TIMEOUT_FACTOR, MAX_REDIRECTS, READ_TIMEOUT_SECS};
use super::error::DownloadError;
use crate::user_agent;

/// Construction options for [`HttpClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// User-Agent sent with every request.
    pub user_agent: String,
    /// Maximum time to establish a connection.
    pub connect_timeout: Duration,
    /// Maximum time to wait for any single read, including each body chunk.
    pub read_timeout: Duration,
    /// Whether 3xx responses are followed.
    pub follow_redirects: bool,
    /// Pre-rendered `Cookie` header attached to every request.
    pub cookie_header: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            user_agent: user_agent::default_user_agent(),
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
            follow_redirects: true,
            cookie_header: None,
        }
    }
}

impl ClientOptions {
    /// Upper bound for a request to produce response headers.
    #[must_use]
    pub fn header_timeout(&self) -> Duration {
        (self.connect_timeout + self.read_timeout) * HEADER_TIMEOUT_FACTOR
    }
}

/// One followed redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectHop {
    /// URL that answered with the redirect.
    pub from: Url,
    /// URL the redirect pointed at.
    pub to: Url,
    /// Redirect status code.
    pub status: u16,
}

/// A response whose headers have arrived and whose body is still unread.
#[derive(Debug)]
pub struct FetchedResponse {
    response: reqwest::Response,
    redirects: Vec<RedirectHop>,
}

impl FetchedResponse {
    /// Final status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    /// Final URL after any redirects.
    #[must_use]
    pub fn url(&self) -> &Url {
        self.response.url()
    }

    /// Final response headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        self.response.headers()
    }

    /// Redirects followed to reach this response, oldest first.
    #[must_use]
    pub fn redirects(&self) -> &[RedirectHop] {
        &self.redirects
    }

    /// Gives up the redirect history and returns the streamable response.
    #[must_use]
    pub fn into_response(self) -> reqwest::Response {
        self.response
    }
}

/// HTTP client for probing and downloading with streaming support.
///
/// Created once per run and cloned into every task; clones share the
/// underlying connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    follow_redirects: bool,
    header_timeout: Duration,
}

impl HttpClient {
    /// Builds the client from `options`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] if reqwest rejects the
    /// configuration (for example an invalid User-Agent or cookie header).
    #[instrument(level = "debug", skip(options), fields(user_agent = %options.user_agent))]
    pub fn new(options: ClientOptions) -> Result<Self, DownloadError> {
        let mut builder = Client::builder()
            .connect_timeout(options.connect_timeout)
            .read_timeout(options.read_timeout)
            .gzip(true)
            .user_agent(options.user_agent.clone())
            .redirect(redirect::Policy::none());

        if let Some(cookie) = options.cookie_header.as_deref() {
            match HeaderValue::from_str(cookie) {
                Ok(value) => {
                    let mut headers = HeaderMap::new();
                    headers.insert(COOKIE, value);
                    builder = builder.default_headers(headers);
                }
                Err(error) => warn!(%error, "ignoring cookies that do not form a valid header"),
            }
        }

        let client = builder
            .build()
            .map_err(|source| DownloadError::ClientBuild { source })?;

        debug!(
            follow_redirects = options.follow_redirects,
            header_timeout_secs = options.header_timeout().as_secs(),
            "HTTP client ready"
        );

        Ok(Self {
            client,
            follow_redirects: options.follow_redirects,
            header_timeout: options.header_timeout(),
        })
    }

    /// Sends a HEAD request without credentials.
    ///
    /// # Errors
    ///
    /// Returns a transport [`DownloadError`] if no response headers arrive.
    pub async fn head(&self, url: &Url) -> Result<FetchedResponse, DownloadError> {
        self.send(Method::HEAD, url, None).await
    }

    /// Sends a GET request, returning as soon as headers arrive.
    ///
    /// Credentials are attached as HTTP basic auth, and only to the host of
    /// `url`: a redirect to another origin drops them.
    ///
    /// # Errors
    ///
    /// Returns a transport [`DownloadError`] if no response headers arrive.
    pub async fn get(
        &self,
        url: &Url,
        credentials: Option<&Credentials>,
    ) -> Result<FetchedResponse, DownloadError> {
        self.send(Method::GET, url, credentials).await
    }

    #[instrument(level = "debug", skip(self, credentials), fields(url = %url, with_auth = credentials.is_some()))]
    async fn send(
        &self,
        mut method: Method,
        url: &Url,
        credentials: Option<&Credentials>,
    ) -> Result<FetchedResponse, DownloadError> {
        let mut current = url.clone();
        let mut redirects = Vec::new();

        loop {
            let mut request = self.client.request(method.clone(), current.clone());
            if let Some(credentials) = credentials
                && same_origin(&current, url)
            {
                request = request.basic_auth(credentials.username(), Some(credentials.password()));
            }

            let response = tokio::time::timeout(self.header_timeout, request.send())
                .await
                .map_err(|_| DownloadError::timeout(current.as_str()))?
                .map_err(|e| DownloadError::network(current.as_str(), e))?;

            let status = response.status();
            if !self.follow_redirects || !is_followable_redirect(status) {
                return Ok(FetchedResponse {
                    response,
                    redirects,
                });
            }

            if redirects.len() >= MAX_REDIRECTS {
                return Err(DownloadError::too_many_redirects(url.as_str(), MAX_REDIRECTS));
            }

            let next = redirect_target(response.headers(), &current).ok_or_else(|| {
                DownloadError::invalid_redirect(current.as_str(), status.as_u16())
            })?;

            if matches!(
                status,
                StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER
            ) && method != Method::HEAD
            {
                method = Method::GET;
            }

            debug!(from = %current, to = %next, status = status.as_u16(), "following redirect");
            redirects.push(RedirectHop {
                from: current,
                to: next.clone(),
                status: status.as_u16(),
            });
            current = next;
        }
    }
}

fn is_followable_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

fn redirect_target(headers: &HeaderMap, base: &Url) -> Option<Url> {
    let location = headers.get(LOCATION)?.to_str().ok()?;
    base.join(location).ok()
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}
