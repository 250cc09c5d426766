//! Bound endpoint configuration shared by every context accepted on it.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use rustls::ServerConfig;

use crate::config::{EndpointConfig, TlsProtocol};
use crate::net::tls::{load_server_config, TlsError};

/// TLS material for an endpoint: the certificate (as a ready server config)
/// and the protocol versions a handshake may settle on.
#[derive(Debug, Clone)]
pub struct EndpointTls {
    pub certificate: Arc<ServerConfig>,
    pub protocols: Vec<TlsProtocol>,
}

/// A configured socket endpoint.
#[derive(Debug)]
pub struct Endpoint {
    name: String,
    address: SocketAddr,
    tls: Option<EndpointTls>,
}

impl Endpoint {
    /// Create a plain endpoint.
    pub fn new(name: impl Into<String>, address: SocketAddr) -> Self {
        Self {
            name: name.into(),
            address,
            tls: None,
        }
    }

    /// Attach TLS material.
    pub fn with_tls(mut self, tls: EndpointTls) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Build from configuration, loading certificates from disk.
    pub fn from_config(config: &EndpointConfig) -> Result<Self, EndpointError> {
        let address: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|_| EndpointError::Address(config.bind_address.clone()))?;

        let mut endpoint = Self::new(config.name.clone(), address);
        if let Some(tls) = &config.tls {
            let certificate = load_server_config(
                Path::new(&tls.cert_path),
                Path::new(&tls.key_path),
                &tls.protocols,
            )?;
            endpoint = endpoint.with_tls(EndpointTls {
                certificate,
                protocols: tls.protocols.clone(),
            });
        }
        Ok(endpoint)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn tls(&self) -> Option<&EndpointTls> {
        self.tls.as_ref()
    }

    pub fn is_secure(&self) -> bool {
        self.tls.is_some()
    }
}

/// Error building an endpoint.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("invalid bind address '{0}'")]
    Address(String),
    #[error(transparent)]
    Tls(#[from] TlsError),
}
