//! Error types for the download module.
//!
//! This module defines structured errors for all download operations,
//! providing context-rich error messages for debugging and user feedback.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching or storing a download.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, reset, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out (connect, headers, or a body read).
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// File system error during download (create file, write, etc.)
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The redirect chain exceeded the hop limit.
    #[error("too many redirects downloading {url} (limit {limit})")]
    TooManyRedirects {
        /// The URL whose redirect chain was abandoned.
        url: String,
        /// The hop limit that was exceeded.
        limit: usize,
    },

    /// A redirect response carried no usable `Location` header.
    #[error("HTTP {status} redirect from {url} has no usable Location header")]
    InvalidRedirect {
        /// The URL that answered with the redirect.
        url: String,
        /// The redirect status code.
        status: u16,
    },

    /// The operator could not be asked for credentials, or aborted the prompt.
    #[error("credential prompt for {host} failed: {reason}")]
    Prompt {
        /// Host that requested authentication.
        host: String,
        /// Why the prompt did not produce credentials.
        reason: String,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {source}")]
    ClientBuild {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },
}

impl DownloadError {
    /// Creates a network or timeout error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            return Self::timeout(url);
        }
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a redirect-limit error.
    pub fn too_many_redirects(url: impl Into<String>, limit: usize) -> Self {
        Self::TooManyRedirects {
            url: url.into(),
            limit,
        }
    }

    /// Creates an invalid-redirect error.
    pub fn invalid_redirect(url: impl Into<String>, status: u16) -> Self {
        Self::InvalidRedirect {
            url: url.into(),
            status,
        }
    }

    /// Creates a prompt failure error.
    pub fn prompt(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Prompt {
            host: host.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for failures of the network exchange itself
    /// (connect, reset, read, timeout, broken redirect chain).
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Network { .. }
                | Self::Timeout { .. }
                | Self::TooManyRedirects { .. }
                | Self::InvalidRedirect { .. }
        )
    }
}

// No `From<reqwest::Error>` / `From<std::io::Error>`: every variant needs the
// url or path the source error lacks, so callers go through the constructors.
