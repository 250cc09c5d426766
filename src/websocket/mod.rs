//! WebSocket handoff.
//!
//! # Data Flow
//! ```text
//! HTTP context classified as WebSocket
//!     → handshake.rs (Sec-WebSocket-Accept computation)
//!     → 101 Switching Protocols sent by the context
//!     → socket.rs (WebSocket takes the transport)
//!     → registry.rs (listener-wide map by path + client id)
//! ```
//!
//! # Design Decisions
//! - Frame handling is outside this crate; the socket only owns the stream
//! - Registry is lock-free per shard (DashMap), shared by every context

pub mod handshake;
pub mod registry;
pub mod socket;

pub use handshake::{accept_key, CLIENT_ID_HEADER, WEBSOCKET_MAGIC};
pub use registry::WebSocketRegistry;
pub use socket::WebSocket;
