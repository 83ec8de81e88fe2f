//! Skips socket-bound tests where localhost cannot be bound.
//!
//! Set `CDOWNLOADER_REQUIRE_SOCKET_TESTS=1` to turn a skip into a failure.

use std::net::TcpListener;
use std::panic::Location;

use wiremock::MockServer;

const REQUIRE_ENV: &str = "CDOWNLOADER_REQUIRE_SOCKET_TESTS";

/// True when the calling test should return early because no localhost
/// socket can be bound.
#[track_caller]
#[must_use]
pub fn should_skip_socket_bound_test() -> bool {
    if TcpListener::bind("127.0.0.1:0").is_ok() {
        return false;
    }
    let caller = Location::caller();
    let required = std::env::var(REQUIRE_ENV).is_ok_and(|value| {
        matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
    });
    assert!(
        !required,
        "{caller}: cannot bind a localhost socket and {REQUIRE_ENV} is set"
    );
    eprintln!("{caller}: cannot bind a localhost socket; skipping");
    true
}

/// Starts a wiremock server, or returns `None` when sockets are unavailable.
pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    if should_skip_socket_bound_test() {
        None
    } else {
        Some(MockServer::start().await)
    }
}
