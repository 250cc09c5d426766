//! Per-connection protocol contexts for HTTP, WebSocket and SMTP listeners.

pub mod config;
pub mod context;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod protocol;
pub mod websocket;

pub use config::SwitchyardConfig;
pub use context::{ConnectionContext, ContextError, ContextState, ContextType, Disposition};
pub use lifecycle::Shutdown;
pub use net::listener::{ContextHandler, Listener, ListenerHandle};
