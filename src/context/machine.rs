//! The connection context state machine.
//!
//! A context binds one accepted transport to one request and one response,
//! classifies the protocol the connection carries, and decides on disposal
//! whether the connection is closed or re-armed for another exchange.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use uuid::Uuid;

use crate::config::ListenerKind;
use crate::context::data::ContextData;
use crate::context::state::{ContextId, ContextState, ContextType, Disposition};
use crate::net::endpoint::Endpoint;
use crate::net::listener::ListenerHandle;
use crate::net::transport::BoxedTransport;
use crate::observability::metrics;
use crate::protocol::{HttpRequest, Request, RequestError, Response, SmtpRequest};
use crate::websocket::{accept_key, WebSocket, CLIENT_ID_HEADER};

/// Error raised by explicit context operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ContextError {
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),
    #[error("cannot upgrade a non-websocket request")]
    NotWebSocket,
    #[error("request is not an {0} request")]
    WrongRequestKind(&'static str),
    #[error("connection was handed off to a websocket")]
    HandedOff,
    #[error("websocket client '{client_id}' is already connected on {path}")]
    DuplicateClient { path: String, client_id: String },
    #[error(transparent)]
    Request(#[from] RequestError),
}

/// Per-connection protocol context.
#[derive(Debug)]
pub struct ConnectionContext {
    id: ContextId,
    request: Request,
    response: Response,
    peer_addr: SocketAddr,
    endpoint: Arc<Endpoint>,
    listener: ListenerHandle,
    timestamp: SystemTime,
    accepted_at: Instant,
    data: ContextData,
    state: ContextState,
    kind: ContextType,
    handed_off: bool,
}

impl ConnectionContext {
    /// Take ownership of an accepted transport and open its request stream.
    ///
    /// Never fails: an unusable connection is reported through [`state`](Self::state).
    pub async fn accept(
        transport: BoxedTransport,
        peer_addr: SocketAddr,
        endpoint: Arc<Endpoint>,
        listener: ListenerHandle,
    ) -> Self {
        let request = match listener.kind() {
            ListenerKind::Smtp => Request::smtp(transport, listener.smtp_server_name()),
            ListenerKind::Http | ListenerKind::WebSocket => Request::http(transport),
        };

        let mut context = Self {
            id: ContextId::new(),
            request,
            response: Response::new(),
            peer_addr,
            endpoint,
            listener,
            timestamp: SystemTime::now(),
            accepted_at: Instant::now(),
            data: ContextData::new(),
            state: ContextState::New,
            kind: ContextType::Unknown,
            handed_off: false,
        };

        context.new_response();
        context.open_request().await;
        metrics::record_context_accepted(context.listener.kind());
        context
    }

    fn new_response(&mut self) {
        self.response = Response::new();
    }

    async fn open_request(&mut self) {
        let endpoint = Arc::clone(&self.endpoint);
        let (certificate, protocols) = match endpoint.tls() {
            Some(tls) => (Some(&tls.certificate), tls.protocols.as_slice()),
            None => (None, &[][..]),
        };

        match self.request.open(certificate, protocols).await {
            Ok(()) => {
                self.state = ContextState::Open;
                tracing::debug!(
                    context_id = %self.id,
                    peer_addr = %self.peer_addr,
                    endpoint = %endpoint.name(),
                    tls = ?self.request.negotiated_protocol(),
                    "Request stream opened"
                );
            }
            Err(e) => {
                self.state = if self.request.has_input_stream() {
                    ContextState::SslError
                } else {
                    ContextState::Error
                };
                tracing::warn!(
                    context_id = %self.id,
                    peer_addr = %self.peer_addr,
                    endpoint = %endpoint.name(),
                    state = %self.state,
                    error = %e,
                    "Failed to open request stream"
                );
                metrics::record_context_error(self.state);
            }
        }

        // SMTP clients wait for the greeting before saying anything.
        if self.listener.kind() == ListenerKind::Smtp {
            if let Some(smtp) = self.request.as_smtp_mut() {
                if let Err(e) = smtp.send_ack().await {
                    tracing::debug!(context_id = %self.id, error = %e, "SMTP greeting failed");
                }
            }
        }
    }

    /// Classify the connection's protocol. Runs once; later calls return the
    /// stored type.
    pub fn classify(&mut self) -> Result<ContextType, ContextError> {
        if self.kind != ContextType::Unknown {
            return Ok(self.kind);
        }

        let kind = match self.listener.kind() {
            ListenerKind::Smtp => {
                self.smtp_request()?;
                ContextType::Smtp
            }
            ListenerKind::WebSocket => {
                if !self.http_request()?.is_websocket_upgrade() {
                    return Err(ContextError::ProtocolViolation(
                        "request is not for a websocket",
                    ));
                }
                ContextType::WebSocket
            }
            ListenerKind::Http => {
                if self.http_request()?.is_websocket_upgrade() {
                    ContextType::WebSocket
                } else {
                    ContextType::Http
                }
            }
        };

        self.kind = kind;
        Ok(kind)
    }

    /// Drive one receive cycle. Failures end up in [`state`](Self::state).
    pub async fn receive(&mut self) {
        if self.handed_off || self.state == ContextState::Closed || self.is_errored() {
            tracing::debug!(
                context_id = %self.id,
                state = %self.state,
                handed_off = self.handed_off,
                "Ignoring receive on finished context"
            );
            return;
        }

        self.state = ContextState::Receiving;
        let limits = *self.listener.limits();
        if let Err(e) = self.request.receive(&limits).await {
            self.state = ContextState::Error;
            tracing::warn!(
                context_id = %self.id,
                peer_addr = %self.peer_addr,
                status = e.status_code(),
                error = %e,
                "Failed to receive request"
            );
            metrics::record_context_error(self.state);
            return;
        }

        self.state = ContextState::Received;
        if self.request.close_immediately() {
            return;
        }

        if let Err(e) = self.classify() {
            self.state = ContextState::Error;
            tracing::warn!(
                context_id = %self.id,
                peer_addr = %self.peer_addr,
                error = %e,
                "Failed to classify request"
            );
            metrics::record_context_error(self.state);
        }
    }

    /// Re-arm for another exchange on the same connection.
    ///
    /// Replaces the response and leaves the context in `Receiving`; the
    /// socket layer calls [`receive`](Self::receive) once data arrives.
    pub fn start_receive(&mut self) {
        self.new_response();
        self.state = ContextState::Receiving;
        metrics::record_keepalive_reuse();
        tracing::trace!(
            context_id = %self.id,
            exchanges = self.request.exchanges(),
            "Context re-armed for keep-alive"
        );
    }

    /// Complete the WebSocket handshake and hand the transport to a new
    /// [`WebSocket`] registered with the listener.
    pub async fn upgrade_websocket(
        &mut self,
        client_id: Option<String>,
    ) -> Result<Arc<WebSocket>, ContextError> {
        if !self.is_websocket() {
            return Err(ContextError::NotWebSocket);
        }
        if self.handed_off {
            return Err(ContextError::HandedOff);
        }

        let client_id = match client_id {
            Some(id) if !id.trim().is_empty() => id,
            _ => Uuid::new_v4().to_string(),
        };

        let (socket_key, path) = {
            let http = self.http_request()?;
            let key = http
                .headers()
                .get("Sec-WebSocket-Key")
                .unwrap_or_default()
                .trim()
                .to_string();
            (key, http.path().to_string())
        };

        if self.listener.websockets().contains(&path, &client_id) {
            return Err(ContextError::DuplicateClient { path, client_id });
        }

        self.response.set_status(101, "Switching Protocols");
        let headers = self.response.headers_mut();
        headers.clear();
        headers.add("Connection", "Upgrade");
        headers.add("Upgrade", "websocket");
        headers.add("Sec-WebSocket-Accept", accept_key(&socket_key));
        headers.add(CLIENT_ID_HEADER, client_id.as_str());

        let stream = self.request.stream_mut()?;
        self.response
            .send(stream)
            .await
            .map_err(RequestError::from)?;

        let stream = self
            .request
            .take_stream()
            .ok_or(RequestError::StreamUnavailable)?;
        self.handed_off = true;

        let socket = match self.listener.add_websocket(WebSocket::new(
            self.id,
            path,
            client_id,
            self.peer_addr,
            stream,
        )) {
            Ok(socket) => socket,
            Err(rejected) => {
                // Lost a race for the key after the handshake went out.
                if let Err(e) = rejected.close().await {
                    tracing::debug!(context_id = %self.id, error = %e, "WebSocket close failed");
                }
                return Err(ContextError::DuplicateClient {
                    path: rejected.path().to_string(),
                    client_id: rejected.client_id().to_string(),
                });
            }
        };

        tracing::info!(
            context_id = %self.id,
            peer_addr = %self.peer_addr,
            path = %socket.path(),
            client_id = %socket.client_id(),
            "Upgraded to websocket"
        );
        metrics::record_websocket_upgrade();
        Ok(socket)
    }

    /// Dispose, forcing closure when the exchange failed.
    pub async fn dispose(&mut self) -> Disposition {
        let force = self.request.error().is_some() || self.is_errored();
        self.dispose_with(force).await
    }

    /// Send the response and either close the connection or re-arm it.
    ///
    /// Every step is best effort; failures are logged and skipped.
    pub async fn dispose_with(&mut self, force: bool) -> Disposition {
        if self.state == ContextState::Closed {
            return Disposition::Closed;
        }

        if self.handed_off {
            self.response.dispose();
            self.state = ContextState::Closed;
            return Disposition::Closed;
        }

        let errored = self.is_errored();
        let smtp = self.request.is_smtp();
        let keep_alive = self.is_keep_alive() && !force && !errored;

        if errored {
            self.response.set_status_code(500);
        }

        // A peer that hung up before sending anything gets no response.
        if !smtp && self.state != ContextState::SslError && !self.request.close_immediately() {
            if !keep_alive && !self.response.headers().contains("Connection") {
                self.response.headers_mut().add("Connection", "close");
            }
            match self.request.stream_mut() {
                Ok(stream) => {
                    if let Err(e) = self.response.send(stream).await {
                        tracing::debug!(context_id = %self.id, error = %e, "Failed to send response");
                    }
                }
                Err(e) => {
                    tracing::debug!(context_id = %self.id, error = %e, "No stream to send response on");
                }
            }
        }

        if smtp {
            if let Some(request) = self.request.as_smtp_mut() {
                if request.can_process() {
                    request.reset();
                }
            }
        }

        self.response.dispose();

        if !keep_alive {
            self.state = ContextState::Closed;
            if let Err(e) = self.request.dispose().await {
                tracing::debug!(context_id = %self.id, error = %e, "Failed to release request");
            }
            tracing::debug!(
                context_id = %self.id,
                peer_addr = %self.peer_addr,
                kind = %self.kind,
                exchanges = self.request.exchanges(),
                age = ?self.age(),
                "Context closed"
            );
            return Disposition::Closed;
        }

        self.start_receive();
        Disposition::KeepAlive
    }

    /// Unique id, stable for the context's lifetime.
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ContextState {
        self.state
    }

    /// Protocol the connection was classified as.
    pub fn kind(&self) -> ContextType {
        self.kind
    }

    /// Wall-clock acceptance time.
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// Time since acceptance.
    pub fn age(&self) -> Duration {
        self.accepted_at.elapsed()
    }

    /// Remote address of the connection.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Endpoint the connection was accepted on.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Listener the connection belongs to.
    pub fn listener(&self) -> &ListenerHandle {
        &self.listener
    }

    /// User data attached to this connection.
    pub fn data(&self) -> &ContextData {
        &self.data
    }

    /// Mutable user data attached to this connection.
    pub fn data_mut(&mut self) -> &mut ContextData {
        &mut self.data
    }

    /// The current request, whichever protocol it speaks.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// The request as HTTP, failing on SMTP listeners.
    pub fn http_request(&self) -> Result<&HttpRequest, ContextError> {
        self.request
            .as_http()
            .ok_or(ContextError::WrongRequestKind("HTTP"))
    }

    /// The request as SMTP, failing on HTTP-class listeners.
    pub fn smtp_request(&self) -> Result<&SmtpRequest, ContextError> {
        self.request
            .as_smtp()
            .ok_or(ContextError::WrongRequestKind("SMTP"))
    }

    /// Response for the current exchange.
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Mutable response for the current exchange.
    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// Classified as a WebSocket upgrade.
    pub fn is_websocket(&self) -> bool {
        self.kind == ContextType::WebSocket
    }

    /// Classified as SMTP.
    pub fn is_smtp(&self) -> bool {
        self.kind == ContextType::Smtp
    }

    /// Whether the request asks for the connection to stay open.
    pub fn is_keep_alive(&self) -> bool {
        self.request.is_keep_alive()
    }

    /// In `Error` or `SslError`.
    pub fn is_errored(&self) -> bool {
        self.state.is_errored()
    }

    /// The connection should be torn down without handling.
    pub fn close_immediately(&self) -> bool {
        self.state == ContextState::Error || self.request.close_immediately()
    }

    /// The transport now belongs to a WebSocket.
    pub fn is_handed_off(&self) -> bool {
        self.handed_off
    }
}
