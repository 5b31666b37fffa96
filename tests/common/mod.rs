//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use range_guard::config::ProxyConfig;
use range_guard::inspection::HttpPatterns;
use range_guard::lifecycle::Shutdown;
use range_guard::net::Listener;
use range_guard::proxy::{pipe_config, Acceptor};

/// Canned backend reply.
pub const RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok";

/// What the mock backend observed on one of its connections.
#[derive(Debug, PartialEq, Eq)]
pub enum BackendEvent {
    /// A complete header block arrived (and was answered with [`RESPONSE`]).
    Request(Vec<u8>),
    /// The proxy closed the connection; carries any unterminated bytes.
    Closed(Vec<u8>),
}

/// Start a backend that answers every complete header block with
/// [`RESPONSE`] and reports what it received.
pub async fn start_mock_backend() -> (SocketAddr, mpsc::UnboundedReceiver<BackendEvent>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut pending = Vec::new();
                let mut chunk = [0u8; 4096];
                loop {
                    let n = match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => n,
                    };
                    pending.extend_from_slice(&chunk[..n]);
                    if pending.ends_with(b"\r\n\r\n") {
                        let _ = tx.send(BackendEvent::Request(std::mem::take(&mut pending)));
                        if socket.write_all(RESPONSE).await.is_err() {
                            break;
                        }
                    }
                }
                let _ = tx.send(BackendEvent::Closed(pending));
            });
        }
    });

    (addr, rx)
}

/// Start the proxy on an ephemeral loopback port in front of `backend`.
pub async fn start_proxy(backend: SocketAddr) -> (SocketAddr, Shutdown) {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.backend.address = backend.to_string();
    config.timeouts.connect_secs = 1;

    let patterns = Arc::new(HttpPatterns::compile().unwrap());
    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let acceptor = Acceptor::new(listener, &config, pipe_config(&config, patterns));

    let shutdown = Shutdown::new();
    tokio::spawn(acceptor.run(shutdown.subscribe()));
    (addr, shutdown)
}

/// A request carrying `n` byte-range units.
pub fn request_with_ranges(n: usize) -> Vec<u8> {
    let ranges = (0..n)
        .map(|i| format!("{}-{}", i * 10, i * 10 + 1))
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "GET /large.bin HTTP/1.1\r\nHost: backend\r\nRange: bytes={}\r\n\r\n",
        ranges
    )
    .into_bytes()
}

/// Next backend event, failing the test if none arrives in time.
pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<BackendEvent>) -> BackendEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("backend event expected")
        .expect("backend channel closed")
}
