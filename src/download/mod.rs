//! HTTP download engine for concurrent, streamed downloads.
//!
//! This module provides everything between a list of URLs and the files they
//! end up in on disk.
//!
//! # Features
//!
//! - Streaming downloads, written directly to disk or buffered in memory
//! - Basic-authentication probing with an interactive credential fallback
//! - Redirect following with a per-request hop history
//! - Configurable connect and read timeouts
//! - Group-wide cooperative cancellation
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cdownloader_core::download::{
//!     ClientOptions, DownloadEngine, DownloadRequest, HttpClient, TaskOptions,
//! };
//! use cdownloader_core::progress::ProgressRegistry;
//!
//! # struct NoPrompt;
//! # #[async_trait::async_trait]
//! # impl cdownloader_core::download::CredentialPrompt for NoPrompt {
//! #     async fn prompt(&self, host: &str) -> Result<cdownloader_core::download::Credentials, cdownloader_core::download::DownloadError> {
//! #         Err(cdownloader_core::download::DownloadError::prompt(host, "no terminal"))
//! #     }
//! # }
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new(ClientOptions::default())?;
//! let registry = Arc::new(ProgressRegistry::hidden());
//! let engine = DownloadEngine::new(client, registry, Arc::new(NoPrompt), TaskOptions::default());
//! let requests = vec![DownloadRequest::new("https://example.com/file.tar.gz", ".")];
//! let report = engine.run(requests, std::future::pending::<()>()).await;
//! println!("finished {} downloads", report.outcomes.len());
//! # Ok(())
//! # }
//! ```

mod auth;
mod client;
mod constants;
mod engine;
mod error;
mod filename;
mod outcome;
mod sink;
mod task;

pub use auth::{CredentialPrompt, Credentials, is_basic_challenge, requires_auth};
pub use client::{ClientOptions, FetchedResponse, HttpClient, RedirectHop};
pub use constants::{DEFAULT_CHUNK_SIZE, MAX_REDIRECTS};
pub use engine::{BatchReport, DownloadEngine, dedupe_requests};
pub use error::DownloadError;
pub use filename::{
    PathClaims, extension_from_content_type, filename_from_url, resolve_destination,
    sanitize_filename,
};
pub use outcome::TransferOutcome;
pub use task::{DownloadRequest, TaskContext, TaskOptions, TaskState, run_download};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
