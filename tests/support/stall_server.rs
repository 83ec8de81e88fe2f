//! Minimal HTTP/1.1 server whose GET body stops part-way.
//!
//! Every GET is answered with a `Content-Length` of `declared` bytes (or no
//! `Content-Length` at all when `declared` is `None`), but only `served` is
//! written before the connection is held open without sending more. HEAD
//! gets the same headers with no body. Used to interrupt a download
//! mid-transfer at a known byte count.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::socket_guard::should_skip_socket_bound_test;

/// How long a stalled connection is held before the server gives up on it.
const HOLD_FOR: Duration = Duration::from_secs(30);

/// Starts the server in a background thread and returns its base URL
/// (e.g. `http://127.0.0.1:12345`), or `None` when sockets cannot be bound.
pub fn start(declared: Option<u64>, served: Vec<u8>) -> Option<String> {
    if should_skip_socket_bound_test() {
        return None;
    }
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    let served = Arc::new(served);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let served = Arc::clone(&served);
            thread::spawn(move || handle(stream, declared, &served));
        }
    });
    Some(format!("http://127.0.0.1:{port}"))
}

fn handle(mut stream: TcpStream, declared: Option<u64>, served: &[u8]) {
    let _ = stream.set_read_timeout(Some(HOLD_FOR));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let request = String::from_utf8_lossy(&buf[..n]);
    let method = request.split_whitespace().next().unwrap_or("");

    let length = declared.map_or_else(String::new, |n| format!("Content-Length: {n}\r\n"));
    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\n\
         {length}Connection: close\r\n\r\n"
    );
    if stream.write_all(head.as_bytes()).is_err() {
        return;
    }
    if method.eq_ignore_ascii_case("HEAD") {
        return;
    }
    if stream.write_all(served).is_err() || stream.flush().is_err() {
        return;
    }
    // Hold the connection until the client hangs up or HOLD_FOR elapses.
    let _ = stream.read(&mut buf);
}
