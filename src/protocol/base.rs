//! Shared request state: the input stream and the recorded error.
//!
//! # Responsibilities
//! - Own the raw transport until the request is opened
//! - Wrap it in TLS when the endpoint carries a certificate
//! - Remember whether an input stream was ever established
//! - Buffer reads for the protocol parsers

use std::sync::Arc;

use rustls::ServerConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_rustls::TlsAcceptor;

use crate::config::TlsProtocol;
use crate::net::transport::{BoxedStream, BoxedTransport};
use crate::protocol::error::RequestError;

const READ_CHUNK: usize = 8 * 1024;

enum InputStream {
    /// Never established, or already released.
    Absent,
    /// Established, then lost during TLS negotiation.
    Broken,
    Ready(BoxedStream),
}

/// State every request variant carries.
pub struct RequestBase {
    transport: Option<BoxedTransport>,
    input: InputStream,
    negotiated: Option<TlsProtocol>,
    error: Option<RequestError>,
    peer_closed: bool,
    exchanges: u64,
}

impl RequestBase {
    pub fn new(transport: BoxedTransport) -> Self {
        Self {
            transport: Some(transport),
            input: InputStream::Absent,
            negotiated: None,
            error: None,
            peer_closed: false,
            exchanges: 0,
        }
    }

    /// Open the input stream, negotiating TLS when a certificate is given.
    pub async fn open(
        &mut self,
        certificate: Option<&Arc<ServerConfig>>,
        protocols: &[TlsProtocol],
    ) -> Result<(), RequestError> {
        let result = self.open_inner(certificate, protocols).await;
        if let Err(e) = &result {
            self.error = Some(e.clone());
        }
        result
    }

    async fn open_inner(
        &mut self,
        certificate: Option<&Arc<ServerConfig>>,
        protocols: &[TlsProtocol],
    ) -> Result<(), RequestError> {
        let transport = self
            .transport
            .take()
            .ok_or(RequestError::StreamUnavailable)?;
        transport.configure()?;

        let Some(certificate) = certificate else {
            self.input = InputStream::Ready(Box::new(transport));
            return Ok(());
        };

        // From here on the stream exists; any failure is a negotiation failure.
        self.input = InputStream::Broken;
        let tls = TlsAcceptor::from(Arc::clone(certificate))
            .accept(transport)
            .await
            .map_err(|e| RequestError::Tls(e.to_string()))?;

        let negotiated = tls
            .get_ref()
            .1
            .protocol_version()
            .and_then(TlsProtocol::from_negotiated);
        match negotiated {
            Some(version) if protocols.is_empty() || protocols.contains(&version) => {
                self.negotiated = Some(version);
                self.input = InputStream::Ready(Box::new(tls));
                Ok(())
            }
            other => Err(RequestError::Tls(format!(
                "negotiated protocol {other:?} is not allowed"
            ))),
        }
    }

    /// Whether an input stream was established, even if negotiation then failed.
    pub fn has_input_stream(&self) -> bool {
        !matches!(self.input, InputStream::Absent)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.input, InputStream::Ready(_))
    }

    /// TLS version agreed with the peer, if the stream is secure.
    pub fn negotiated_protocol(&self) -> Option<TlsProtocol> {
        self.negotiated
    }

    pub fn stream_mut(&mut self) -> Result<&mut BoxedStream, RequestError> {
        match &mut self.input {
            InputStream::Ready(stream) => Ok(stream),
            _ => Err(RequestError::StreamUnavailable),
        }
    }

    /// Hand the open stream to a new owner.
    pub fn take_stream(&mut self) -> Option<BoxedStream> {
        match std::mem::replace(&mut self.input, InputStream::Absent) {
            InputStream::Ready(stream) => Some(stream),
            other => {
                self.input = other;
                None
            }
        }
    }

    /// Append whatever is available to `buffer`. Returns 0 at end of stream.
    pub async fn read_into(&mut self, buffer: &mut Vec<u8>) -> Result<usize, RequestError> {
        let stream = self.stream_mut()?;
        let mut chunk = [0u8; READ_CHUNK];
        let n = stream.read(&mut chunk).await?;
        buffer.extend_from_slice(&chunk[..n]);
        Ok(n)
    }

    pub async fn write_all(&mut self, bytes: &[u8]) -> Result<(), RequestError> {
        let stream = self.stream_mut()?;
        stream.write_all(bytes).await?;
        stream.flush().await?;
        Ok(())
    }

    pub fn error(&self) -> Option<&RequestError> {
        self.error.as_ref()
    }

    pub fn record_error(&mut self, error: RequestError) {
        self.error = Some(error);
    }

    pub fn peer_closed(&self) -> bool {
        self.peer_closed
    }

    pub fn set_peer_closed(&mut self) {
        self.peer_closed = true;
    }

    /// Completed exchanges over this connection.
    pub fn exchanges(&self) -> u64 {
        self.exchanges
    }

    pub fn complete_exchange(&mut self) {
        self.exchanges += 1;
    }

    /// Shut the stream down and release it.
    pub async fn dispose(&mut self) -> Result<(), RequestError> {
        self.transport = None;
        if let InputStream::Ready(mut stream) = std::mem::replace(&mut self.input, InputStream::Absent) {
            stream.shutdown().await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for RequestBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let input = match self.input {
            InputStream::Absent => "absent",
            InputStream::Broken => "broken",
            InputStream::Ready(_) => "ready",
        };
        f.debug_struct("RequestBase")
            .field("input", &input)
            .field("negotiated", &self.negotiated)
            .field("error", &self.error)
            .field("peer_closed", &self.peer_closed)
            .field("exchanges", &self.exchanges)
            .finish_non_exhaustive()
    }
}
