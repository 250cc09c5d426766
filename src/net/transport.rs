//! Transport abstraction for accepted connections.
//!
//! A `Transport` is the raw byte stream handed over by the listener. Once a
//! request opens it (optionally wrapping it in TLS) it becomes an `IoStream`.

use std::io;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio::net::TcpStream;

/// A bidirectional byte stream accepted by a listener.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {
    /// Apply socket-level options before the stream is used.
    ///
    /// A failure here means no input stream could be established at all.
    fn configure(&self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for TcpStream {
    fn configure(&self) -> io::Result<()> {
        self.set_nodelay(true)
    }
}

impl Transport for DuplexStream {}

/// Boxed raw transport as owned by a request before it is opened.
pub type BoxedTransport = Box<dyn Transport>;

/// An opened input stream: plain or TLS-wrapped.
pub trait IoStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> IoStream for T {}

/// Boxed opened stream.
pub type BoxedStream = Box<dyn IoStream>;
