//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → SwitchyardConfig (validated, immutable)
//!     → listener endpoints, limits, observability
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    EndpointConfig, LimitsConfig, ListenerConfig, ListenerKind, ObservabilityConfig, SmtpConfig,
    SwitchyardConfig, TimeoutConfig, TlsConfig, TlsProtocol,
};
