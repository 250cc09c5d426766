//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     broadcast → listener stops accepting → drain connections → exit
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, drain, close websockets
//! - Shutdown has timeout: forced exit after deadline

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
