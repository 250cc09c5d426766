//! Request-level errors.

use std::io;
use std::sync::Arc;

/// Failure while opening, reading or parsing a request.
///
/// Cloneable so a request can both record the error and report it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RequestError {
    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),
    #[error("TLS negotiation failed: {0}")]
    Tls(String),
    #[error("input stream is not available")]
    StreamUnavailable,
    #[error("malformed request: {0}")]
    Malformed(String),
    #[error("request head exceeds {0} bytes")]
    HeadersTooLarge(usize),
    #[error("request body exceeds {0} bytes")]
    BodyTooLarge(usize),
    #[error("unsupported request: {0}")]
    Unsupported(String),
    #[error("connection closed mid-request")]
    UnexpectedEof,
}

impl RequestError {
    /// HTTP status that best describes this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            RequestError::Malformed(_) | RequestError::UnexpectedEof | RequestError::Tls(_) => 400,
            RequestError::HeadersTooLarge(_) => 431,
            RequestError::BodyTooLarge(_) => 413,
            RequestError::Unsupported(_) => 501,
            RequestError::Io(_) | RequestError::StreamUnavailable => 500,
        }
    }
}

impl From<io::Error> for RequestError {
    fn from(e: io::Error) -> Self {
        RequestError::Io(Arc::new(e))
    }
}
