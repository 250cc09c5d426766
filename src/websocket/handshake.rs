//! WebSocket opening handshake (RFC 6455 §4.2.2).

use base64::prelude::*;
use sha1::{Digest, Sha1};

/// GUID appended to the client key before hashing.
pub const WEBSOCKET_MAGIC: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Header carrying the client identifier assigned on upgrade.
pub const CLIENT_ID_HEADER: &str = "X-Pode-ClientId";

/// Compute `Sec-WebSocket-Accept` for a `Sec-WebSocket-Key`.
pub fn accept_key(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(WEBSOCKET_MAGIC.as_bytes());
    BASE64_STANDARD.encode(&sha1.finalize()[..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc6455_sample_key() {
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn key_is_used_verbatim() {
        assert_ne!(
            accept_key(" dGhlIHNhbXBsZSBub25jZQ=="),
            accept_key("dGhlIHNhbXBsZSBub25jZQ==")
        );
    }
}
