//! Registry of open WebSocket connections, keyed by (path, client id).

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::observability::metrics;
use crate::websocket::socket::WebSocket;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
    path: String,
    client_id: String,
}

/// Concurrent map of live WebSockets.
#[derive(Debug, Default)]
pub struct WebSocketRegistry {
    sockets: DashMap<Key, Arc<WebSocket>>,
}

impl WebSocketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a socket. Fails, handing the socket back, when a live
    /// socket already holds the same (path, client id); a closed one is
    /// replaced.
    pub fn try_add(&self, socket: WebSocket) -> Result<Arc<WebSocket>, WebSocket> {
        let key = Key {
            path: socket.path().to_string(),
            client_id: socket.client_id().to_string(),
        };
        let socket = match self.sockets.entry(key) {
            Entry::Occupied(entry) if !entry.get().is_closed() => return Err(socket),
            Entry::Occupied(mut entry) => {
                let socket = Arc::new(socket);
                entry.insert(Arc::clone(&socket));
                socket
            }
            Entry::Vacant(entry) => {
                let socket = Arc::new(socket);
                entry.insert(Arc::clone(&socket));
                socket
            }
        };
        metrics::set_open_websockets(self.sockets.len());
        Ok(socket)
    }

    /// Whether a live socket holds (path, client id).
    pub fn contains(&self, path: &str, client_id: &str) -> bool {
        self.get(path, client_id)
            .is_some_and(|socket| !socket.is_closed())
    }

    pub fn get(&self, path: &str, client_id: &str) -> Option<Arc<WebSocket>> {
        self.sockets
            .get(&Key {
                path: path.to_string(),
                client_id: client_id.to_string(),
            })
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, path: &str, client_id: &str) -> Option<Arc<WebSocket>> {
        let removed = self
            .sockets
            .remove(&Key {
                path: path.to_string(),
                client_id: client_id.to_string(),
            })
            .map(|(_, socket)| socket);
        metrics::set_open_websockets(self.sockets.len());
        removed
    }

    /// Close `socket` and drop its entry, unless the entry now belongs to
    /// another socket.
    pub async fn release(&self, socket: &Arc<WebSocket>) {
        self.sockets.remove_if(
            &Key {
                path: socket.path().to_string(),
                client_id: socket.client_id().to_string(),
            },
            |_, registered| Arc::ptr_eq(registered, socket),
        );
        metrics::set_open_websockets(self.sockets.len());
        if let Err(e) = socket.close().await {
            tracing::debug!(client_id = %socket.client_id(), error = %e, "WebSocket close failed");
        }
    }

    /// Drop entries whose socket was closed without being released.
    pub fn prune(&self) -> usize {
        let before = self.sockets.len();
        self.sockets.retain(|_, socket| !socket.is_closed());
        let after = self.sockets.len();
        metrics::set_open_websockets(after);
        before.saturating_sub(after)
    }

    /// Every socket upgraded on `path`.
    pub fn on_path(&self, path: &str) -> Vec<Arc<WebSocket>> {
        self.sockets
            .iter()
            .filter(|entry| entry.key().path == path)
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }

    /// Close and drop every socket.
    pub async fn close_all(&self) {
        let sockets: Vec<Arc<WebSocket>> = self
            .sockets
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        self.sockets.clear();
        for socket in sockets {
            if let Err(e) = socket.close().await {
                tracing::debug!(client_id = %socket.client_id(), error = %e, "WebSocket close failed");
            }
        }
        metrics::set_open_websockets(0);
    }
}
