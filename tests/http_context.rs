//! HTTP contexts over a real TCP listener.

use std::time::Duration;

use switchyard::config::ListenerKind;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

mod common;

#[tokio::test]
async fn keep_alive_reuses_connection() {
    let server = common::start(common::local_config(ListenerKind::Http)).await;
    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(1)
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    let first = client
        .get(format!("http://{}/first", server.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 200);
    assert_eq!(first.headers()["x-exchange"], "1");
    assert_eq!(first.text().await.unwrap(), "/first");

    // Give the client time to return the connection to its pool.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = client
        .get(format!("http://{}/second?x=1", server.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 200);
    assert_eq!(second.headers()["x-exchange"], "2");
    assert_eq!(second.text().await.unwrap(), "/second");

    server.stop().await;
}

#[tokio::test]
async fn connection_close_ends_connection() {
    let server = common::start(common::local_config(ListenerKind::Http)).await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream
        .write_all(b"GET /bye HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();
    assert!(raw.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(raw.contains("Connection: close\r\n"));
    assert!(raw.ends_with("\r\n\r\n/bye"));

    server.stop().await;
}

#[tokio::test]
async fn http_10_closes_by_default() {
    let server = common::start(common::local_config(ListenerKind::Http)).await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream.write_all(b"GET /old HTTP/1.0\r\n\r\n").await.unwrap();

    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();
    assert!(raw.contains("Connection: close\r\n"));
    assert!(raw.ends_with("/old"));

    server.stop().await;
}

#[tokio::test]
async fn malformed_request_gets_500_and_close() {
    let server = common::start(common::local_config(ListenerKind::Http)).await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream.write_all(b"NOT A REQUEST\r\n\r\n").await.unwrap();

    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();
    assert!(raw.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
    assert!(raw.contains("Connection: close\r\n"));

    server.stop().await;
}

#[tokio::test]
async fn websocket_listener_rejects_plain_http() {
    let server = common::start(common::local_config(ListenerKind::WebSocket)).await;
    let response = reqwest::get(format!("http://{}/", server.addr))
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
    assert_eq!(response.headers()["connection"], "close");

    server.stop().await;
}
