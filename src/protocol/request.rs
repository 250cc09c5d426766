//! Protocol request variants.

use std::sync::Arc;

use rustls::ServerConfig;

use crate::config::{LimitsConfig, TlsProtocol};
use crate::net::transport::{BoxedStream, BoxedTransport};
use crate::protocol::base::RequestBase;
use crate::protocol::error::RequestError;
use crate::protocol::http::HttpRequest;
use crate::protocol::smtp::SmtpRequest;

/// The request side of a connection. The set of protocols is closed.
#[derive(Debug)]
pub enum Request {
    Http(HttpRequest),
    Smtp(SmtpRequest),
}

impl Request {
    pub fn http(transport: BoxedTransport) -> Self {
        Request::Http(HttpRequest::new(transport))
    }

    pub fn smtp(transport: BoxedTransport, server_name: impl Into<String>) -> Self {
        Request::Smtp(SmtpRequest::new(transport, server_name))
    }

    fn base(&self) -> &RequestBase {
        match self {
            Request::Http(http) => http.base(),
            Request::Smtp(smtp) => smtp.base(),
        }
    }

    fn base_mut(&mut self) -> &mut RequestBase {
        match self {
            Request::Http(http) => http.base_mut(),
            Request::Smtp(smtp) => smtp.base_mut(),
        }
    }

    /// Open the input stream with the endpoint's certificate, if any.
    pub async fn open(
        &mut self,
        certificate: Option<&Arc<ServerConfig>>,
        protocols: &[TlsProtocol],
    ) -> Result<(), RequestError> {
        self.base_mut().open(certificate, protocols).await
    }

    /// Read and parse the next request. Failures are also recorded.
    pub async fn receive(&mut self, limits: &LimitsConfig) -> Result<(), RequestError> {
        let result = match self {
            Request::Http(http) => http.receive(limits).await,
            Request::Smtp(smtp) => smtp.receive(limits).await,
        };
        if let Err(e) = &result {
            self.base_mut().record_error(e.clone());
        }
        result
    }

    pub fn has_input_stream(&self) -> bool {
        self.base().has_input_stream()
    }

    pub fn is_keep_alive(&self) -> bool {
        match self {
            Request::Http(http) => http.is_keep_alive(),
            Request::Smtp(smtp) => smtp.is_keep_alive(),
        }
    }

    pub fn close_immediately(&self) -> bool {
        match self {
            Request::Http(http) => http.close_immediately(),
            Request::Smtp(smtp) => smtp.close_immediately(),
        }
    }

    /// Whether the last receive produced something for a handler to act on.
    pub fn is_processable(&self) -> bool {
        match self {
            Request::Http(http) => !http.close_immediately() && !http.method().is_empty(),
            Request::Smtp(smtp) => smtp.can_process(),
        }
    }

    /// Request-level error recorded by the last open or receive.
    pub fn error(&self) -> Option<&RequestError> {
        self.base().error()
    }

    /// Completed exchanges over the connection's lifetime.
    pub fn exchanges(&self) -> u64 {
        self.base().exchanges()
    }

    pub fn negotiated_protocol(&self) -> Option<TlsProtocol> {
        self.base().negotiated_protocol()
    }

    pub fn is_smtp(&self) -> bool {
        matches!(self, Request::Smtp(_))
    }

    pub fn as_http(&self) -> Option<&HttpRequest> {
        match self {
            Request::Http(http) => Some(http),
            Request::Smtp(_) => None,
        }
    }

    pub fn as_smtp(&self) -> Option<&SmtpRequest> {
        match self {
            Request::Smtp(smtp) => Some(smtp),
            Request::Http(_) => None,
        }
    }

    pub fn as_smtp_mut(&mut self) -> Option<&mut SmtpRequest> {
        match self {
            Request::Smtp(smtp) => Some(smtp),
            Request::Http(_) => None,
        }
    }

    pub fn stream_mut(&mut self) -> Result<&mut BoxedStream, RequestError> {
        self.base_mut().stream_mut()
    }

    pub fn take_stream(&mut self) -> Option<BoxedStream> {
        self.base_mut().take_stream()
    }

    /// Shut the transport down.
    pub async fn dispose(&mut self) -> Result<(), RequestError> {
        self.base_mut().dispose().await
    }
}
