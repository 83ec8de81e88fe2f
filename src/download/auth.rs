//! Basic-authentication probing and credential handling.

use std::fmt;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, WWW_AUTHENTICATE};
use tracing::{debug, instrument};
use url::Url;

use super::client::HttpClient;
use super::error::DownloadError;

/// Username/password pair sent as HTTP basic authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Creates a credential pair.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Builds credentials from optional CLI values; `None` unless both
    /// are present.
    #[must_use]
    pub fn from_parts(username: Option<String>, password: Option<String>) -> Option<Self> {
        Some(Self::new(username?, password?))
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Source of credentials for a host that demanded basic authentication
/// when none were supplied up front.
#[async_trait]
pub trait CredentialPrompt: Send + Sync {
    /// Asks for a username and password for `host`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Prompt`] when no credentials could be obtained.
    async fn prompt(&self, host: &str) -> Result<Credentials, DownloadError>;
}

/// Returns true when a 401 response carries a `Basic` challenge.
///
/// Only basic authentication is supported; any other scheme is reported as
/// not requiring auth so the unauthenticated attempt surfaces its status.
#[must_use]
pub fn is_basic_challenge(status: StatusCode, headers: &HeaderMap) -> bool {
    status == StatusCode::UNAUTHORIZED
        && headers
            .get(WWW_AUTHENTICATE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("Basic"))
}

/// Determines whether `url` demands basic authentication.
///
/// With `probe_with_head`, a HEAD request goes first and a basic challenge
/// there settles the question. Otherwise (or when HEAD was inconclusive) a
/// GET is sent and dropped as soon as its headers arrive, so no body is read.
///
/// # Errors
///
/// Propagates transport failures of either probe request.
#[instrument(skip(client), fields(url = %url))]
pub async fn requires_auth(
    client: &HttpClient,
    url: &Url,
    probe_with_head: bool,
) -> Result<bool, DownloadError> {
    if probe_with_head {
        let response = client.head(url).await?;
        if is_basic_challenge(response.status(), response.headers()) {
            debug!("HEAD probe received basic challenge");
            return Ok(true);
        }
    }

    let response = client.get(url, None).await?;
    let status = response.status().as_u16();
    let required = is_basic_challenge(response.status(), response.headers());
    drop(response);
    debug!(required, status, "GET probe finished");
    Ok(required)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use crate::download::ClientOptions;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use reqwest::header::HeaderValue;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    fn headers_with_challenge(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(WWW_AUTHENTICATE, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_basic_challenge_recognized() {
        let headers = headers_with_challenge("Basic realm=\"x\"");
        assert!(is_basic_challenge(StatusCode::UNAUTHORIZED, &headers));
    }

    #[test]
    fn test_other_schemes_not_recognized() {
        let headers = headers_with_challenge("Digest realm=\"x\", nonce=\"abc\"");
        assert!(!is_basic_challenge(StatusCode::UNAUTHORIZED, &headers));
        let headers = headers_with_challenge("Bearer");
        assert!(!is_basic_challenge(StatusCode::UNAUTHORIZED, &headers));
    }

    #[test]
    fn test_basic_header_without_401_not_recognized() {
        let headers = headers_with_challenge("Basic realm=\"x\"");
        assert!(!is_basic_challenge(StatusCode::FORBIDDEN, &headers));
        assert!(!is_basic_challenge(StatusCode::OK, &headers));
    }

    #[test]
    fn test_401_without_header_not_recognized() {
        assert!(!is_basic_challenge(StatusCode::UNAUTHORIZED, &HeaderMap::new()));
    }

    #[test]
    fn test_credentials_from_parts() {
        assert_eq!(Credentials::from_parts(None, None), None);
        assert_eq!(
            Credentials::from_parts(Some("u".into()), Some("p".into())),
            Some(Credentials::new("u", "p"))
        );
        assert_eq!(Credentials::from_parts(Some("u".into()), None), None);
        assert_eq!(Credentials::from_parts(None, Some("p".into())), None);
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let rendered = format!("{:?}", Credentials::new("alice", "hunter2"));
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_head_challenge_short_circuits_get_probe() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("HEAD"))
            .and(path("/locked"))
            .respond_with(
                ResponseTemplate::new(401).insert_header("WWW-Authenticate", "Basic realm=\"x\""),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/locked"))
            .respond_with(ResponseTemplate::new(401))
            .expect(0)
            .mount(&server)
            .await;

        let client = HttpClient::new(ClientOptions::default()).unwrap();
        let url = Url::parse(&format!("{}/locked", server.uri())).unwrap();
        assert!(requires_auth(&client, &url, true).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_probe_detects_challenge_when_head_is_open() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("HEAD"))
            .and(path("/get-only"))
            .respond_with(ResponseTemplate::new(405))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/get-only"))
            .respond_with(
                ResponseTemplate::new(401).insert_header("WWW-Authenticate", "Basic realm=\"y\""),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new(ClientOptions::default()).unwrap();
        let url = Url::parse(&format!("{}/get-only", server.uri())).unwrap();
        assert!(requires_auth(&client, &url, true).await.unwrap());
    }

    #[tokio::test]
    async fn test_probe_without_head_sends_only_get() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/open.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4096]))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new(ClientOptions::default()).unwrap();
        let url = Url::parse(&format!("{}/open.bin", server.uri())).unwrap();
        assert!(!requires_auth(&client, &url, false).await.unwrap());
    }

    #[tokio::test]
    async fn test_digest_challenge_reports_no_auth() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .and(path("/digest"))
            .respond_with(
                ResponseTemplate::new(401)
                    .insert_header("WWW-Authenticate", "Digest realm=\"x\", nonce=\"n\""),
            )
            .mount(&server)
            .await;

        let client = HttpClient::new(ClientOptions::default()).unwrap();
        let url = Url::parse(&format!("{}/digest", server.uri())).unwrap();
        assert!(!requires_auth(&client, &url, false).await.unwrap());
    }
}
