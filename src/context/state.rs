//! Context identity, lifecycle state and protocol type.

use uuid::Uuid;

/// Unique identifier for a connection context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(Uuid);

impl ContextId {
    /// Generate a new unique context ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a context.
///
/// ```text
/// New → Open → Receiving → Received ─┬→ Closed (disposal)
///  │                 ▲        │      └→ Receiving (keep-alive)
///  └→ Error | SslError          └→ Error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    New,
    Open,
    Receiving,
    Received,
    Error,
    SslError,
    Closed,
}

impl ContextState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextState::New => "new",
            ContextState::Open => "open",
            ContextState::Receiving => "receiving",
            ContextState::Received => "received",
            ContextState::Error => "error",
            ContextState::SslError => "ssl_error",
            ContextState::Closed => "closed",
        }
    }

    pub fn is_errored(&self) -> bool {
        matches!(self, ContextState::Error | ContextState::SslError)
    }
}

impl std::fmt::Display for ContextState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire protocol a context turned out to carry. Set once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextType {
    #[default]
    Unknown,
    Http,
    WebSocket,
    Smtp,
}

impl std::fmt::Display for ContextType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextType::Unknown => write!(f, "unknown"),
            ContextType::Http => write!(f, "http"),
            ContextType::WebSocket => write!(f, "websocket"),
            ContextType::Smtp => write!(f, "smtp"),
        }
    }
}

/// Outcome of disposing a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Transport released; the context is finished.
    Closed,
    /// Re-armed for another receive on the same connection.
    KeepAlive,
}
