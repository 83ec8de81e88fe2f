//! Constants for the download module (timeouts, chunking, redirects).

/// Default HTTP connect timeout (10 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default HTTP read timeout (60 seconds between body chunks).
pub const READ_TIMEOUT_SECS: u64 = 60;

/// Factor applied to `connect + read` to bound a request until headers arrive.
pub const HEADER_TIMEOUT_FACTOR: u32 = 2;

/// Default size of the slices the body stream is cut into (1 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Maximum number of redirect hops followed for a single request.
pub const MAX_REDIRECTS: usize = 10;
