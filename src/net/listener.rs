//! TCP listener with backpressure.
//!
//! # Responsibilities
//! - Bind every configured endpoint
//! - Enforce max_connections via semaphore
//! - Drive one context per accepted connection on its own task
//! - Stop accepting on shutdown and drain live connections

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;

use crate::config::{LimitsConfig, ListenerKind, SwitchyardConfig};
use crate::context::{ConnectionContext, Disposition};
use crate::net::connection::ConnectionTracker;
use crate::net::endpoint::{Endpoint, EndpointError};
use crate::websocket::{WebSocket, WebSocketRegistry};

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("Invalid endpoint '{name}': {source}")]
    Endpoint {
        name: String,
        #[source]
        source: EndpointError,
    },
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Application code run once per received request.
#[async_trait]
pub trait ContextHandler: Send + Sync + 'static {
    async fn handle(&self, context: &mut ConnectionContext);
}

/// Shared, read-only view of a listener handed to every context.
#[derive(Debug, Clone)]
pub struct ListenerHandle {
    inner: Arc<HandleInner>,
}

#[derive(Debug)]
struct HandleInner {
    kind: ListenerKind,
    limits: LimitsConfig,
    smtp_server_name: String,
    websockets: WebSocketRegistry,
}

impl ListenerHandle {
    pub fn new(kind: ListenerKind, limits: LimitsConfig, smtp_server_name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                kind,
                limits,
                smtp_server_name: smtp_server_name.into(),
                websockets: WebSocketRegistry::new(),
            }),
        }
    }

    pub fn kind(&self) -> ListenerKind {
        self.inner.kind
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.inner.limits
    }

    pub fn smtp_server_name(&self) -> &str {
        &self.inner.smtp_server_name
    }

    /// Register an upgraded connection. The socket is handed back when a
    /// live socket already holds its (path, client id).
    pub fn add_websocket(&self, socket: WebSocket) -> Result<Arc<WebSocket>, WebSocket> {
        self.inner.websockets.prune();
        self.inner.websockets.try_add(socket)
    }

    /// Close an upgraded connection and unregister it.
    pub async fn release_websocket(&self, socket: &Arc<WebSocket>) {
        self.inner.websockets.release(socket).await;
    }

    pub fn websockets(&self) -> &WebSocketRegistry {
        &self.inner.websockets
    }
}

/// A bounded listener over one or more endpoints.
pub struct Listener {
    sockets: Vec<(TcpListener, Arc<Endpoint>)>,
    handle: ListenerHandle,
    connection_limit: Arc<Semaphore>,
    max_connections: usize,
    tracker: ConnectionTracker,
    receive_timeout: Option<Duration>,
    shutdown_timeout: Duration,
}

impl Listener {
    /// Bind every configured endpoint.
    pub async fn bind(config: &SwitchyardConfig) -> Result<Self, ListenerError> {
        let mut sockets = Vec::with_capacity(config.listener.endpoints.len());
        for endpoint_config in &config.listener.endpoints {
            let endpoint =
                Endpoint::from_config(endpoint_config).map_err(|source| ListenerError::Endpoint {
                    name: endpoint_config.name.clone(),
                    source,
                })?;
            let address = endpoint.address();
            let socket = TcpListener::bind(address)
                .await
                .map_err(|source| ListenerError::Bind { address, source })?;

            tracing::info!(
                endpoint = %endpoint.name(),
                address = %socket.local_addr().unwrap_or(address),
                kind = %config.listener.kind,
                tls = endpoint.is_secure(),
                "Endpoint bound"
            );
            sockets.push((socket, Arc::new(endpoint)));
        }

        let receive_timeout = match config.timeouts.receive_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(Self {
            sockets,
            handle: ListenerHandle::new(
                config.listener.kind,
                config.limits,
                config.smtp.server_name.clone(),
            ),
            connection_limit: Arc::new(Semaphore::new(config.listener.max_connections)),
            max_connections: config.listener.max_connections,
            tracker: ConnectionTracker::new(),
            receive_timeout,
            shutdown_timeout: Duration::from_secs(config.timeouts.shutdown_secs),
        })
    }

    /// Addresses actually bound, in endpoint order.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.sockets
            .iter()
            .filter_map(|(socket, _)| socket.local_addr().ok())
            .collect()
    }

    pub fn handle(&self) -> &ListenerHandle {
        &self.handle
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Accept until `shutdown` fires, then drain live connections and close
    /// registered WebSockets.
    pub async fn run<H: ContextHandler>(self, handler: Arc<H>, mut shutdown: broadcast::Receiver<()>) {
        let (stop, _) = broadcast::channel(1);
        let mut accept_loops = JoinSet::new();
        for (socket, endpoint) in self.sockets {
            let worker = AcceptLoop {
                socket,
                endpoint,
                handle: self.handle.clone(),
                connection_limit: Arc::clone(&self.connection_limit),
                tracker: self.tracker.clone(),
                receive_timeout: self.receive_timeout,
            };
            accept_loops.spawn(worker.run(Arc::clone(&handler), stop.subscribe()));
        }

        // A closed or lagged channel counts as a shutdown request too.
        let _ = shutdown.recv().await;
        let _ = stop.send(());

        while accept_loops.join_next().await.is_some() {}

        tracing::info!(
            active = self.tracker.active_count(),
            "Listener stopped accepting, draining connections"
        );
        if !self.tracker.wait_for_drain(self.shutdown_timeout).await {
            tracing::warn!(
                active = self.tracker.active_count(),
                "Shutdown timeout reached with connections still open"
            );
        }
        self.handle.websockets().close_all().await;
        tracing::info!("Listener stopped");
    }
}

struct AcceptLoop {
    socket: TcpListener,
    endpoint: Arc<Endpoint>,
    handle: ListenerHandle,
    connection_limit: Arc<Semaphore>,
    tracker: ConnectionTracker,
    receive_timeout: Option<Duration>,
}

impl AcceptLoop {
    async fn run<H: ContextHandler>(self, handler: Arc<H>, mut shutdown: broadcast::Receiver<()>) {
        loop {
            // Acquire permit first (backpressure)
            let permit = tokio::select! {
                _ = shutdown.recv() => break,
                permit = Arc::clone(&self.connection_limit).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let (stream, peer_addr) = tokio::select! {
                _ = shutdown.recv() => break,
                accepted = self.socket.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!(endpoint = %self.endpoint.name(), error = %e, "Failed to accept connection");
                        continue;
                    }
                },
            };

            tracing::debug!(
                peer_addr = %peer_addr,
                endpoint = %self.endpoint.name(),
                available_permits = self.connection_limit.available_permits(),
                "Connection accepted"
            );

            let guard = self.tracker.track();
            let endpoint = Arc::clone(&self.endpoint);
            let handle = self.handle.clone();
            let handler = Arc::clone(&handler);
            let receive_timeout = self.receive_timeout;
            tokio::spawn(async move {
                let _permit = permit;
                let _guard = guard;
                serve_connection(stream, peer_addr, endpoint, handle, handler.as_ref(), receive_timeout)
                    .await;
            });
        }
    }
}

/// Drive one connection's context through every exchange it carries.
async fn serve_connection<H: ContextHandler>(
    stream: TcpStream,
    peer_addr: SocketAddr,
    endpoint: Arc<Endpoint>,
    handle: ListenerHandle,
    handler: &H,
    receive_timeout: Option<Duration>,
) {
    let accept = ConnectionContext::accept(Box::new(stream), peer_addr, endpoint, handle);
    let mut context = match receive_timeout {
        Some(limit) => match tokio::time::timeout(limit, accept).await {
            Ok(context) => context,
            Err(_) => {
                // Dropping the half-open context closes the transport unanswered.
                tracing::debug!(peer_addr = %peer_addr, "Connection setup timed out");
                return;
            }
        },
        None => accept.await,
    };
    if context.is_errored() {
        context.dispose().await;
        return;
    }

    loop {
        let received = match receive_timeout {
            Some(limit) => tokio::time::timeout(limit, context.receive()).await.is_ok(),
            None => {
                context.receive().await;
                true
            }
        };
        if !received {
            tracing::debug!(context_id = %context.id(), "Receive timed out");
            context.response_mut().set_status_code(408);
            context.dispose_with(true).await;
            return;
        }

        if context.close_immediately() {
            context.dispose_with(true).await;
            return;
        }

        if context.request().is_processable() {
            handler.handle(&mut context).await;
        }

        if context.is_handed_off() {
            context.dispose().await;
            return;
        }
        if context.dispose().await == Disposition::Closed {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EndpointConfig, TlsConfig, TlsProtocol};
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

    struct PathHandler;

    #[async_trait]
    impl ContextHandler for PathHandler {
        async fn handle(&self, context: &mut ConnectionContext) {
            let path = match context.http_request() {
                Ok(request) => request.path().to_string(),
                Err(_) => return,
            };
            context.response_mut().set_body(path);
        }
    }

    fn config(kind: ListenerKind, receive_secs: u64) -> SwitchyardConfig {
        let mut config = SwitchyardConfig::default();
        config.listener.kind = kind;
        config.listener.endpoints = vec![EndpointConfig {
            name: "local".into(),
            bind_address: "127.0.0.1:0".into(),
            tls: None,
        }];
        config.timeouts.receive_secs = receive_secs;
        config.timeouts.shutdown_secs = 1;
        config.smtp.server_name = "mx.test".into();
        config
    }

    async fn start(config: SwitchyardConfig) -> (SocketAddr, broadcast::Sender<()>) {
        let listener = Listener::bind(&config).await.unwrap();
        let addr = listener.local_addrs()[0];
        let (tx, rx) = broadcast::channel(1);
        tokio::spawn(listener.run(Arc::new(PathHandler), rx));
        (addr, tx)
    }

    #[tokio::test]
    async fn bind_rejects_bad_address() {
        let mut config = config(ListenerKind::Http, 0);
        config.listener.endpoints[0].bind_address = "nowhere".into();
        let err = Listener::bind(&config).await.err().unwrap();
        assert!(matches!(err, ListenerError::Endpoint { .. }));
    }

    #[tokio::test]
    async fn serves_pipelined_requests_on_one_connection() {
        let (addr, _shutdown) = start(config(ListenerKind::Http, 5)).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /a HTTP/1.1\r\nHost: x\r\n\r\nGET /bb HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();

        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();
        assert_eq!(raw.matches("HTTP/1.1 200 OK").count(), 2);
        assert!(raw.contains("Content-Length: 2\r\n\r\n/a"));
        assert!(raw.ends_with("Connection: close\r\nContent-Length: 3\r\n\r\n/bb"));
    }

    #[tokio::test]
    async fn idle_connection_gets_408() {
        let (addr, _shutdown) = start(config(ListenerKind::Http, 1)).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();
        assert!(raw.starts_with("HTTP/1.1 408 Request Timeout\r\n"));
    }

    #[tokio::test]
    async fn stalled_tls_handshake_releases_its_slot() {
        let fixtures = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");
        let mut config = config(ListenerKind::Http, 1);
        config.listener.max_connections = 1;
        config.listener.endpoints[0].tls = Some(TlsConfig {
            cert_path: format!("{fixtures}/cert.pem"),
            key_path: format!("{fixtures}/key.pem"),
            protocols: vec![TlsProtocol::Tls13],
        });
        let (addr, _shutdown) = start(config).await;

        // Never sends a ClientHello; the listener must drop it unanswered.
        let mut idle = TcpStream::connect(addr).await.unwrap();
        let mut unanswered = Vec::new();
        let dropped =
            tokio::time::timeout(Duration::from_secs(3), idle.read_to_end(&mut unanswered)).await;
        assert!(dropped.is_ok());
        assert!(unanswered.is_empty());

        // The only slot is free again.
        let mut next = TcpStream::connect(addr).await.unwrap();
        next.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        let mut raw = Vec::new();
        let serviced =
            tokio::time::timeout(Duration::from_secs(3), next.read_to_end(&mut raw)).await;
        assert!(serviced.is_ok());
        assert!(!String::from_utf8_lossy(&raw).contains("HTTP/1.1"));
    }

    #[tokio::test]
    async fn smtp_listener_greets() {
        let (addr, _shutdown) = start(config(ListenerKind::Smtp, 5)).await;
        let mut stream = BufReader::new(TcpStream::connect(addr).await.unwrap());

        let mut line = String::new();
        stream.read_line(&mut line).await.unwrap();
        assert_eq!(line, "220 mx.test ESMTP ready\r\n");

        stream.get_mut().write_all(b"QUIT\r\n").await.unwrap();
        line.clear();
        stream.read_line(&mut line).await.unwrap();
        assert_eq!(line, "221 Bye\r\n");
    }

    #[tokio::test]
    async fn shutdown_stops_accepting() {
        let config = config(ListenerKind::Http, 5);
        let listener = Listener::bind(&config).await.unwrap();
        let addr = listener.local_addrs()[0];
        let (tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(listener.run(Arc::new(PathHandler), rx));

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(TcpStream::connect(addr).await.is_err());
    }
}
