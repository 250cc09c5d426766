//! Response handling and serialization.
//!
//! # Responsibilities
//! - Accumulate status, headers and body for one exchange
//! - Serialize an HTTP/1.1 response onto the connection's stream
//! - Add `Content-Length` when the caller did not
//!
//! # Design Decisions
//! - A response is sent at most once; later sends are no-ops
//! - Informational and 204/304 responses never carry a body

use tokio::io::AsyncWriteExt;

use crate::net::transport::BoxedStream;
use crate::protocol::headers::Headers;

/// Outgoing response for a single exchange.
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    description: String,
    headers: Headers,
    body: Vec<u8>,
    sent: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            status: 200,
            description: reason_phrase(200).to_string(),
            headers: Headers::new(),
            body: Vec::new(),
            sent: false,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Set status code and an explicit description.
    pub fn set_status(&mut self, status: u16, description: impl Into<String>) {
        self.status = status;
        self.description = description.into();
    }

    /// Set status code with its standard reason phrase.
    pub fn set_status_code(&mut self, status: u16) {
        self.set_status(status, reason_phrase(status));
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.body = body.into();
    }

    pub fn write_body(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
    }

    pub fn is_sent(&self) -> bool {
        self.sent
    }

    fn allows_body(&self) -> bool {
        !(100..200).contains(&self.status) && self.status != 204 && self.status != 304
    }

    /// Render the status line, headers and body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128 + self.body.len());
        out.extend_from_slice(
            format!("HTTP/1.1 {} {}\r\n", self.status, self.description).as_bytes(),
        );
        for (name, value) in self.headers.iter() {
            out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        let allows_body = self.allows_body();
        if allows_body && !self.headers.contains("Content-Length") {
            out.extend_from_slice(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        if allows_body {
            out.extend_from_slice(&self.body);
        }
        out
    }

    /// Write the response to `stream` unless it was already sent.
    pub async fn send(&mut self, stream: &mut BoxedStream) -> std::io::Result<()> {
        if self.sent {
            return Ok(());
        }
        let bytes = self.to_bytes();
        stream.write_all(&bytes).await?;
        stream.flush().await?;
        self.sent = true;
        Ok(())
    }

    /// Release buffered headers and body.
    pub fn dispose(&mut self) {
        self.headers.clear();
        self.body = Vec::new();
    }
}

/// Standard reason phrase for the status codes this crate emits.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        304 => "Not Modified",
        400 => "Bad Request",
        404 => "Not Found",
        408 => "Request Timeout",
        409 => "Conflict",
        413 => "Payload Too Large",
        426 => "Upgrade Required",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        503 => "Service Unavailable",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt};

    #[test]
    fn serializes_with_content_length() {
        let mut response = Response::new();
        response.headers_mut().add("Content-Type", "text/plain");
        response.set_body("hi");
        assert_eq!(
            String::from_utf8(response.to_bytes()).unwrap(),
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\n\r\nhi"
        );
    }

    #[test]
    fn switching_protocols_has_no_body() {
        let mut response = Response::new();
        response.set_status(101, "Switching Protocols");
        response.set_body("ignored");
        assert_eq!(
            String::from_utf8(response.to_bytes()).unwrap(),
            "HTTP/1.1 101 Switching Protocols\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn sends_only_once() {
        let (server, mut client) = duplex(1024);
        let mut stream: BoxedStream = Box::new(server);
        let mut response = Response::new();
        response.set_status_code(404);

        response.send(&mut stream).await.unwrap();
        response.send(&mut stream).await.unwrap();
        assert!(response.is_sent());
        drop(stream);

        let mut received = String::new();
        client.read_to_string(&mut received).await.unwrap();
        assert_eq!(
            received,
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n"
        );
    }
}
