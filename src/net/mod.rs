//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (live connection tracking)
//!     → ConnectionContext (TLS via tls.rs, per-endpoint material from endpoint.rs)
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - TLS is optional per endpoint and negotiated by the context

pub mod connection;
pub mod endpoint;
pub mod listener;
pub mod tls;
pub mod transport;
