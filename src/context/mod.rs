//! Per-connection protocol context.
//!
//! # Data Flow
//! ```text
//! Listener accepts transport
//!     → ConnectionContext::accept (response, request, TLS, SMTP greeting)
//!     → receive() (parse, classify: Http | WebSocket | Smtp)
//!     → ContextHandler (may upgrade_websocket)
//!     → dispose() → Closed | KeepAlive (start_receive, loop)
//! ```
//!
//! # Design Decisions
//! - One task owns one context; no locking inside
//! - Setup and receive failures become states, never errors
//! - Disposal is best effort and never fails

pub mod data;
pub mod machine;
pub mod state;

pub use data::ContextData;
pub use machine::{ConnectionContext, ContextError};
pub use state::{ContextId, ContextState, ContextType, Disposition};
