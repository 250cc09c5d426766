//! HTTP/1.x request parsing.
//!
//! # Responsibilities
//! - Read bytes until a complete request head is buffered
//! - Parse the head with `httparse` and keep owned copies of its parts
//! - Read a `Content-Length` body
//! - Expose keep-alive intent and the WebSocket upgrade indicator
//!
//! # Design Decisions
//! - Bytes past the current request stay buffered for the next exchange
//! - Head and body sizes are checked while reading, not after
//! - Chunked transfer coding is rejected with 501

use crate::config::LimitsConfig;
use crate::net::transport::BoxedTransport;
use crate::protocol::base::RequestBase;
use crate::protocol::error::RequestError;
use crate::protocol::headers::Headers;

/// A parsed request head.
struct Head {
    method: String,
    target: String,
    minor_version: u8,
    headers: Headers,
    length: usize,
}

/// An HTTP request read from one connection, reused across keep-alive exchanges.
#[derive(Debug)]
pub struct HttpRequest {
    base: RequestBase,
    buffer: Vec<u8>,
    method: String,
    target: String,
    path: String,
    query: Option<String>,
    minor_version: u8,
    headers: Headers,
    body: Vec<u8>,
    keep_alive: bool,
}

impl HttpRequest {
    pub fn new(transport: BoxedTransport) -> Self {
        Self {
            base: RequestBase::new(transport),
            buffer: Vec::new(),
            method: String::new(),
            target: String::new(),
            path: String::new(),
            query: None,
            minor_version: 1,
            headers: Headers::new(),
            body: Vec::new(),
            keep_alive: false,
        }
    }

    pub fn base(&self) -> &RequestBase {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut RequestBase {
        &mut self.base
    }

    /// Read and parse the next request on the connection.
    pub async fn receive(&mut self, limits: &LimitsConfig) -> Result<(), RequestError> {
        self.clear_exchange();

        let head = loop {
            if let Some(head) = parse_head(&self.buffer, limits)? {
                break head;
            }
            if self.buffer.len() > limits.max_header_bytes {
                return Err(RequestError::HeadersTooLarge(limits.max_header_bytes));
            }
            if self.base.read_into(&mut self.buffer).await? == 0 {
                if self.buffer.is_empty() {
                    self.base.set_peer_closed();
                    return Ok(());
                }
                return Err(RequestError::UnexpectedEof);
            }
        };

        if head.headers.contains("Transfer-Encoding") {
            return Err(RequestError::Unsupported("transfer-encoding".into()));
        }
        let content_length = match head.headers.get("Content-Length") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|_| RequestError::Malformed(format!("invalid content-length '{raw}'")))?,
            None => 0,
        };
        if content_length > limits.max_body_bytes {
            return Err(RequestError::BodyTooLarge(limits.max_body_bytes));
        }

        let total = head.length + content_length;
        while self.buffer.len() < total {
            if self.base.read_into(&mut self.buffer).await? == 0 {
                return Err(RequestError::UnexpectedEof);
            }
        }

        self.body = self.buffer[head.length..total].to_vec();
        self.buffer.drain(..total);

        let (path, query) = split_target(&head.target);
        self.path = path;
        self.query = query;
        self.keep_alive = if head.minor_version == 0 {
            head.headers.has_token("Connection", "keep-alive")
        } else {
            !head.headers.has_token("Connection", "close")
        };
        self.method = head.method;
        self.target = head.target;
        self.minor_version = head.minor_version;
        self.headers = head.headers;

        self.base.complete_exchange();
        Ok(())
    }

    fn clear_exchange(&mut self) {
        self.method.clear();
        self.target.clear();
        self.path.clear();
        self.query = None;
        self.headers.clear();
        self.body.clear();
        self.keep_alive = false;
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Request target as sent on the request line.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Absolute path of the request, without query.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn version(&self) -> &'static str {
        if self.minor_version == 0 {
            "HTTP/1.0"
        } else {
            "HTTP/1.1"
        }
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn host(&self) -> Option<&str> {
        self.headers.get("Host")
    }

    pub fn is_keep_alive(&self) -> bool {
        self.keep_alive && !self.close_immediately()
    }

    /// True when the peer closed before sending anything or the stream is gone.
    pub fn close_immediately(&self) -> bool {
        self.base.peer_closed() || !self.base.is_ready()
    }

    /// Whether this is a WebSocket upgrade request.
    pub fn is_websocket_upgrade(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
            && self
                .headers
                .get("Upgrade")
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket"))
            && self.headers.has_token("Connection", "upgrade")
    }
}

fn parse_head(buffer: &[u8], limits: &LimitsConfig) -> Result<Option<Head>, RequestError> {
    if buffer.is_empty() {
        return Ok(None);
    }

    let mut slots = vec![httparse::EMPTY_HEADER; limits.max_headers];
    let mut request = httparse::Request::new(&mut slots);
    let length = match request.parse(buffer) {
        Ok(httparse::Status::Complete(length)) => length,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(httparse::Error::TooManyHeaders) => {
            return Err(RequestError::HeadersTooLarge(limits.max_header_bytes))
        }
        Err(e) => return Err(RequestError::Malformed(e.to_string())),
    };
    if length > limits.max_header_bytes {
        return Err(RequestError::HeadersTooLarge(limits.max_header_bytes));
    }

    let mut headers = Headers::new();
    for header in request.headers.iter() {
        let value = std::str::from_utf8(header.value)
            .map_err(|_| RequestError::Malformed(format!("non-UTF-8 value for '{}'", header.name)))?;
        headers.add(header.name, value);
    }

    Ok(Some(Head {
        method: request.method.unwrap_or_default().to_string(),
        target: request.path.unwrap_or_default().to_string(),
        minor_version: request.version.unwrap_or(1),
        headers,
        length,
    }))
}

/// Split a request target into absolute path and query.
fn split_target(target: &str) -> (String, Option<String>) {
    // absolute-form: scheme://authority/path
    let without_authority = match target.find("://") {
        Some(idx) => {
            let rest = &target[idx + 3..];
            match rest.find('/') {
                Some(slash) => &rest[slash..],
                None => "/",
            }
        }
        None => target,
    };

    match without_authority.split_once('?') {
        Some((path, query)) => (normalize_path(path), Some(query.to_string())),
        None => (normalize_path(without_authority), None),
    }
}

fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}
