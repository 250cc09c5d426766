//! WebSocket upgrade over a real TCP listener.

use switchyard::config::ListenerKind;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Error as WsError;

mod common;

async fn assert_upgrades(kind: ListenerKind) {
    let server = common::start(common::local_config(kind)).await;

    let request = format!("ws://{}/chat?room=1", server.addr)
        .into_client_request()
        .unwrap();
    let (_socket, response) = tokio_tungstenite::connect_async(request).await.unwrap();

    assert_eq!(response.status(), 101);
    assert_eq!(response.headers()["x-pode-clientid"], "test-client");

    let registry = server.handle.websockets();
    assert!(common::eventually(|| registry.get("/chat", "test-client").is_some()).await);
    let socket = registry.get("/chat", "test-client").unwrap();
    assert_eq!(socket.path(), "/chat");
    assert_eq!(socket.peer_addr().ip(), server.addr.ip());

    server.stop().await;
}

#[tokio::test]
async fn http_listener_upgrades_websocket_requests() {
    assert_upgrades(ListenerKind::Http).await;
}

#[tokio::test]
async fn websocket_listener_upgrades() {
    assert_upgrades(ListenerKind::WebSocket).await;
}

#[tokio::test]
async fn shutdown_closes_registered_sockets() {
    let server = common::start(common::local_config(ListenerKind::Http)).await;
    let (_socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/feed", server.addr))
        .await
        .unwrap();

    let handle = server.handle.clone();
    assert!(common::eventually(|| handle.websockets().len() == 1).await);
    let socket = handle.websockets().get("/feed", "test-client").unwrap();

    server.stop().await;
    assert!(handle.websockets().is_empty());
    assert!(socket.is_closed());
}

#[tokio::test]
async fn disconnected_client_leaves_the_registry() {
    let server = common::start(common::local_config(ListenerKind::Http)).await;
    let (client, _) = tokio_tungstenite::connect_async(format!("ws://{}/feed", server.addr))
        .await
        .unwrap();

    let handle = server.handle.clone();
    assert!(common::eventually(|| handle.websockets().len() == 1).await);
    let socket = handle.websockets().get("/feed", "test-client").unwrap();

    drop(client);
    assert!(common::eventually(|| handle.websockets().is_empty()).await);
    assert!(socket.is_closed());

    server.stop().await;
}

#[tokio::test]
async fn reused_client_id_is_refused_while_first_is_connected() {
    let server = common::start(common::local_config(ListenerKind::Http)).await;
    let url = format!("ws://{}/feed", server.addr);
    let (_first, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();

    let handle = server.handle.clone();
    assert!(common::eventually(|| handle.websockets().len() == 1).await);
    let existing = handle.websockets().get("/feed", "test-client").unwrap();

    match tokio_tungstenite::connect_async(url.as_str()).await {
        Err(WsError::Http(response)) => assert_eq!(response.status(), 409),
        Err(e) => panic!("unexpected handshake error: {e}"),
        Ok(_) => panic!("second client with the same id was upgraded"),
    }

    let current = handle.websockets().get("/feed", "test-client").unwrap();
    assert!(std::sync::Arc::ptr_eq(&existing, &current));
    assert!(!existing.is_closed());

    server.stop().await;
}
