//! End-to-end tests through real sockets: client → proxy → backend.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

mod common;

use common::{BackendEvent, RESPONSE};

/// Read until EOF or reset; returns whatever arrived first.
async fn read_until_closed(stream: &mut TcpStream) -> Vec<u8> {
    let mut received = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut received))
        .await
        .expect("proxy should close the connection");
    received
}

#[tokio::test]
async fn simple_get_is_forwarded_unmodified() {
    let (backend_addr, mut events) = common::start_mock_backend().await;
    let (proxy_addr, shutdown) = common::start_proxy(backend_addr).await;

    let request = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n";
    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client.write_all(request).await.unwrap();

    assert_eq!(common::next_event(&mut events).await, BackendEvent::Request(request.to_vec()));

    let mut response = vec![0u8; RESPONSE.len()];
    client.read_exact(&mut response).await.unwrap();
    assert_eq!(response, RESPONSE);

    shutdown.trigger();
}

#[tokio::test]
async fn split_headers_reach_backend_only_when_complete() {
    let (backend_addr, mut events) = common::start_mock_backend().await;
    let (proxy_addr, shutdown) = common::start_proxy(backend_addr).await;

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client.write_all(b"GET /index.html HTTP/1.1\r\nHost:").await.unwrap();

    let early = tokio::time::timeout(Duration::from_millis(200), events.recv()).await;
    assert!(early.is_err(), "incomplete headers must not be forwarded");

    client.write_all(b" x\r\nRange: bytes=0-99\r\n\r\n").await.unwrap();
    assert_eq!(
        common::next_event(&mut events).await,
        BackendEvent::Request(
            b"GET /index.html HTTP/1.1\r\nHost: x\r\nRange: bytes=0-99\r\n\r\n".to_vec()
        )
    );

    let mut response = vec![0u8; RESPONSE.len()];
    client.read_exact(&mut response).await.unwrap();
    assert_eq!(response, RESPONSE);

    shutdown.trigger();
}

#[tokio::test]
async fn fifty_ranges_are_allowed() {
    let (backend_addr, mut events) = common::start_mock_backend().await;
    let (proxy_addr, shutdown) = common::start_proxy(backend_addr).await;

    let request = common::request_with_ranges(50);
    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client.write_all(&request).await.unwrap();

    assert_eq!(common::next_event(&mut events).await, BackendEvent::Request(request));
    let mut response = vec![0u8; RESPONSE.len()];
    client.read_exact(&mut response).await.unwrap();

    shutdown.trigger();
}

#[tokio::test]
async fn range_attack_never_reaches_backend() {
    let (backend_addr, mut events) = common::start_mock_backend().await;
    let (proxy_addr, shutdown) = common::start_proxy(backend_addr).await;

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client.write_all(&common::request_with_ranges(52)).await.unwrap();

    assert!(read_until_closed(&mut client).await.is_empty());
    assert_eq!(common::next_event(&mut events).await, BackendEvent::Closed(Vec::new()));

    shutdown.trigger();
}

#[tokio::test]
async fn request_range_alias_attack_never_reaches_backend() {
    let (backend_addr, mut events) = common::start_mock_backend().await;
    let (proxy_addr, shutdown) = common::start_proxy(backend_addr).await;

    let request = String::from_utf8(common::request_with_ranges(200))
        .unwrap()
        .replace("\r\nRange:", "\r\nRequest-Range:");
    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client.write_all(request.as_bytes()).await.unwrap();

    assert!(read_until_closed(&mut client).await.is_empty());
    assert_eq!(common::next_event(&mut events).await, BackendEvent::Closed(Vec::new()));

    shutdown.trigger();
}

#[tokio::test]
async fn attack_after_valid_request_ends_keep_alive_session() {
    let (backend_addr, mut events) = common::start_mock_backend().await;
    let (proxy_addr, shutdown) = common::start_proxy(backend_addr).await;

    let first = b"GET /a HTTP/1.1\r\nHost: x\r\n\r\n";
    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client.write_all(first).await.unwrap();
    assert_eq!(common::next_event(&mut events).await, BackendEvent::Request(first.to_vec()));

    let mut response = vec![0u8; RESPONSE.len()];
    client.read_exact(&mut response).await.unwrap();

    client.write_all(&common::request_with_ranges(200)).await.unwrap();
    assert!(read_until_closed(&mut client).await.is_empty());
    assert_eq!(common::next_event(&mut events).await, BackendEvent::Closed(Vec::new()));

    shutdown.trigger();
}

#[tokio::test]
async fn non_http_traffic_passes_through() {
    let (backend_addr, mut events) = common::start_mock_backend().await;
    let (proxy_addr, shutdown) = common::start_proxy(backend_addr).await;

    let payload = b"HELO relay.example\r\n\r\n";
    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client.write_all(payload).await.unwrap();

    assert_eq!(common::next_event(&mut events).await, BackendEvent::Request(payload.to_vec()));

    shutdown.trigger();
}

#[tokio::test]
async fn unreachable_backend_closes_client() {
    let dead_port = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap();
    let (proxy_addr, shutdown) = common::start_proxy(dead_port).await;

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    let _ = client.write_all(b"GET / HTTP/1.1\r\n\r\n").await;
    assert!(read_until_closed(&mut client).await.is_empty());

    shutdown.trigger();
}

#[tokio::test]
async fn shutdown_stops_accepting() {
    let (backend_addr, _events) = common::start_mock_backend().await;
    let (proxy_addr, shutdown) = common::start_proxy(backend_addr).await;

    shutdown.trigger();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(TcpStream::connect(proxy_addr).await.is_err());
}
