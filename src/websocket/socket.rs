//! Upgraded WebSocket connection.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{Mutex, MutexGuard, Notify};

use crate::context::ContextId;
use crate::net::transport::BoxedStream;

/// A connection that completed the upgrade handshake.
///
/// Owns the transport from then on; frame handling is left to whoever
/// locks [`WebSocket::stream`].
pub struct WebSocket {
    context_id: ContextId,
    path: String,
    client_id: String,
    peer_addr: SocketAddr,
    opened_at: SystemTime,
    stream: Mutex<Option<BoxedStream>>,
    closed: AtomicBool,
    closing: Notify,
}

impl WebSocket {
    pub fn new(
        context_id: ContextId,
        path: impl Into<String>,
        client_id: impl Into<String>,
        peer_addr: SocketAddr,
        stream: BoxedStream,
    ) -> Self {
        Self {
            context_id,
            path: path.into(),
            client_id: client_id.into(),
            peer_addr,
            opened_at: SystemTime::now(),
            stream: Mutex::new(Some(stream)),
            closed: AtomicBool::new(false),
            closing: Notify::new(),
        }
    }

    /// Id of the context the connection was upgraded from.
    pub fn context_id(&self) -> ContextId {
        self.context_id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn opened_at(&self) -> SystemTime {
        self.opened_at
    }

    /// Exclusive access to the transport. `None` once closed.
    pub async fn stream(&self) -> MutexGuard<'_, Option<BoxedStream>> {
        self.stream.lock().await
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Read and discard inbound bytes until the peer disconnects or the
    /// socket is closed. Holds the stream for the duration.
    pub async fn drain_inbound(&self) -> std::io::Result<()> {
        let mut guard = self.stream.lock().await;
        let Some(stream) = guard.as_mut() else {
            return Ok(());
        };
        let mut chunk = [0u8; 1024];
        while !self.is_closed() {
            tokio::select! {
                _ = self.closing.notified() => break,
                read = stream.read(&mut chunk) => {
                    if read? == 0 {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Shut the transport down. Closing twice is a no-op.
    pub async fn close(&self) -> std::io::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        // Wakes a pending drain so the stream lock is released.
        self.closing.notify_one();
        let stream = self.stream.lock().await.take();
        if let Some(mut stream) = stream {
            stream.shutdown().await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for WebSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocket")
            .field("context_id", &self.context_id)
            .field("path", &self.path)
            .field("client_id", &self.client_id)
            .field("peer_addr", &self.peer_addr)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn socket() -> (Arc<WebSocket>, tokio::io::DuplexStream) {
        let (server, client) = tokio::io::duplex(64);
        let socket = WebSocket::new(
            ContextId::new(),
            "/chat",
            "a",
            "127.0.0.1:9".parse().unwrap(),
            Box::new(server),
        );
        (Arc::new(socket), client)
    }

    #[tokio::test]
    async fn drain_ends_when_peer_disconnects() {
        let (socket, mut client) = socket();
        client.write_all(b"frame bytes").await.unwrap();
        drop(client);

        tokio::time::timeout(Duration::from_secs(1), socket.drain_inbound())
            .await
            .unwrap()
            .unwrap();
        assert!(!socket.is_closed());
    }

    #[tokio::test]
    async fn close_interrupts_pending_drain() {
        let (socket, _client) = socket();
        let drain = {
            let socket = Arc::clone(&socket);
            tokio::spawn(async move { socket.drain_inbound().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_secs(1), socket.close())
            .await
            .unwrap()
            .unwrap();
        assert!(socket.is_closed());
        assert!(drain.await.unwrap().is_ok());
        assert!(socket.stream().await.is_none());
    }
}
