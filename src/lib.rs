//! cdownloader Core Library
//!
//! This library provides the concurrent download engine behind the `cdl`
//! command: it fetches a fixed set of URLs at once, negotiates HTTP basic
//! authentication when a server asks for it, streams bodies to disk and keeps
//! a live progress entry per download.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`download`] - HTTP client facade, authentication probing, the per-URL
//!   download task and the orchestrator that runs them as a group
//! - [`progress`] - Shared progress registry rendered with `indicatif`
//! - [`memory`] - Available-memory watchdog used in buffered mode
//! - [`user_agent`] - User-Agent presets

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;
pub mod memory;
pub mod progress;
#[cfg(test)]
pub mod test_support;
pub mod user_agent;

// Re-export commonly used types
pub use download::{
    BatchReport, ClientOptions, CredentialPrompt, Credentials, DEFAULT_CHUNK_SIZE, DownloadEngine,
    DownloadError, DownloadRequest, HttpClient, PathClaims, TaskContext, TaskOptions,
    TransferOutcome, dedupe_requests, requires_auth, run_download,
};
pub use memory::{MemoryEvent, MemorySource, MemoryWatchdog, SystemMemory};
pub use progress::{ProgressEntry, ProgressLayout, ProgressRegistry, ProgressUpdate, TaskId};
pub use user_agent::{UserAgentChoice, resolve_user_agent};
