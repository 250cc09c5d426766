//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the listener.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SwitchyardConfig {
    /// Listener configuration (protocol class, endpoints, TLS).
    pub listener: ListenerConfig,

    /// Request size limits.
    pub limits: LimitsConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// SMTP greeting settings.
    pub smtp: SmtpConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Protocol class served by a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ListenerKind {
    /// Plain HTTP, with optional upgrade to WebSocket.
    #[default]
    Http,
    /// Only WebSocket upgrade requests are accepted.
    WebSocket,
    /// SMTP.
    Smtp,
}

impl std::fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerKind::Http => write!(f, "http"),
            ListenerKind::WebSocket => write!(f, "websocket"),
            ListenerKind::Smtp => write!(f, "smtp"),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Protocol class of every endpoint on this listener.
    pub kind: ListenerKind,

    /// Endpoints to bind.
    pub endpoints: Vec<EndpointConfig>,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            kind: ListenerKind::Http,
            endpoints: vec![EndpointConfig::default()],
            max_connections: 10_000,
        }
    }
}

/// A single bound socket.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Endpoint identifier for logging.
    pub name: String,

    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
        }
    }
}

/// TLS protocol versions an endpoint may negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum TlsProtocol {
    #[serde(rename = "tls1.2")]
    Tls12,
    #[serde(rename = "tls1.3")]
    Tls13,
}

impl std::fmt::Display for TlsProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TlsProtocol::Tls12 => write!(f, "tls1.2"),
            TlsProtocol::Tls13 => write!(f, "tls1.3"),
        }
    }
}

/// TLS configuration for an endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate chain file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,

    /// Allowed protocol versions.
    #[serde(default = "default_tls_protocols")]
    pub protocols: Vec<TlsProtocol>,
}

fn default_tls_protocols() -> Vec<TlsProtocol> {
    vec![TlsProtocol::Tls12, TlsProtocol::Tls13]
}

/// Request size limits.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum size of an HTTP request head (request line + headers).
    pub max_header_bytes: usize,

    /// Maximum number of HTTP headers.
    pub max_headers: usize,

    /// Maximum HTTP body or SMTP message size.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_header_bytes: 16 * 1024,
            max_headers: 64,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Idle time allowed while waiting for a request, in seconds. 0 disables.
    pub receive_secs: u64,

    /// Time allowed for in-flight contexts to finish on shutdown, in seconds.
    pub shutdown_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            receive_secs: 60,
            shutdown_secs: 10,
        }
    }
}

/// SMTP settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SmtpConfig {
    /// Host name announced in the greeting.
    pub server_name: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            server_name: "localhost".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable ones.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_smtp_listener() {
        let raw = r#"
            [listener]
            kind = "smtp"

            [[listener.endpoints]]
            name = "mail"
            bind_address = "127.0.0.1:2525"
        "#;
        let config: SwitchyardConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.listener.kind, ListenerKind::Smtp);
        assert_eq!(config.listener.endpoints.len(), 1);
        assert_eq!(config.listener.endpoints[0].name, "mail");
        assert_eq!(config.listener.max_connections, 10_000);
        assert_eq!(config.smtp.server_name, "localhost");
    }

    #[test]
    fn tls_protocols_default_to_both_versions() {
        let raw = r#"
            [listener]
            kind = "websocket"

            [[listener.endpoints]]
            bind_address = "127.0.0.1:8443"
            tls = { cert_path = "cert.pem", key_path = "key.pem" }
        "#;
        let config: SwitchyardConfig = toml::from_str(raw).unwrap();
        let tls = config.listener.endpoints[0].tls.as_ref().unwrap();
        assert_eq!(tls.protocols, vec![TlsProtocol::Tls12, TlsProtocol::Tls13]);
        assert_eq!(config.listener.kind, ListenerKind::WebSocket);
    }

    #[test]
    fn explicit_tls_protocols() {
        let raw = r#"
            [[listener.endpoints]]
            bind_address = "127.0.0.1:8443"
            tls = { cert_path = "c", key_path = "k", protocols = ["tls1.3"] }
        "#;
        let config: SwitchyardConfig = toml::from_str(raw).unwrap();
        let tls = config.listener.endpoints[0].tls.as_ref().unwrap();
        assert_eq!(tls.protocols, vec![TlsProtocol::Tls13]);
        assert_eq!(config.listener.kind, ListenerKind::Http);
    }
}
